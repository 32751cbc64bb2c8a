//! Unitree A1 locomotion environment.
//!
//! A reset/step/render/close environment around the Rapier physics world in
//! `a1-physics`: PD control around a standing pose, a five-term locomotion
//! reward, fall detection and a simulated-time limit.

pub mod config;
pub mod controller;
pub mod driver;
pub mod encoder;
pub mod env;
pub mod episode;
pub mod error;
pub mod ml;
pub mod monitor;
pub mod renderer;
pub mod reward;
pub mod rollout;

#[cfg(test)]
mod testing;

pub use a1_physics;
pub use config::{A1Config, EnvConfig};
pub use env::{A1Env, Env, Info, RenderMode, StepResult};
pub use error::{EnvError, Result};
pub use ml::{Action, BoxSpace, Observation, Policy};
pub use monitor::Monitor;
pub use renderer::{DisplaySink, PngSequenceSink, Viewer};
