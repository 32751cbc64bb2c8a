pub mod policy;
pub mod types;

pub use policy::Policy;
pub use types::{Action, BoxSpace, Observation};
