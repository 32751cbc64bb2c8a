use serde::{Deserialize, Serialize};

/// Simulation parameters for the rapier backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Duration of one physics substep in seconds.
    pub timestep: f32,
    pub solver_iterations: usize,
    /// Z-up gravity vector.
    pub gravity: [f32; 3],
    /// Used for colliders of links without an `<inertial>` block.
    pub fallback_density: f32,
    pub friction: f32,
    pub linear_damping: f32,
    pub angular_damping: f32,
}

impl PhysicsConfig {
    pub const DEFAULT_TIMESTEP: f32 = 0.002;
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            timestep: Self::DEFAULT_TIMESTEP,
            solver_iterations: 8,
            gravity: [0.0, 0.0, -9.81],
            fallback_density: 1000.0,
            friction: 1.0,
            linear_damping: 0.0,
            angular_damping: 0.1,
        }
    }
}
