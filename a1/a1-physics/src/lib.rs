//! Shared Rapier3D physics for the A1 quadruped.
//!
//! Loads a URDF robot description into a floating-base articulated body on a
//! flat ground plane and exposes it through [`SimulationBackend`] in
//! generalized coordinates.

pub mod backend;
pub mod config;
pub mod error;
pub mod state;
pub mod urdf;
pub mod world;

pub use backend::{PrimitiveShape, ScenePrimitive, SimulationBackend};
pub use config::PhysicsConfig;
pub use error::PhysicsError;
pub use state::{SimulationState, BASE_NQ, BASE_NV};
pub use urdf::RobotDescription;
pub use world::PhysicsWorld;
