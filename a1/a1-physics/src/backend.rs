use nalgebra as na;

use crate::error::PhysicsError;
use crate::state::SimulationState;

/// Geometry kinds the viewer knows how to draw.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PrimitiveShape {
    Sphere { radius: f32 },
    Cuboid { half_extents: [f32; 3] },
}

/// One drawable piece of the scene, posed in world coordinates.
#[derive(Clone, Debug)]
pub struct ScenePrimitive {
    pub shape: PrimitiveShape,
    pub pose: na::Isometry3<f32>,
    pub color: [u8; 3],
}

/// A fixed-timestep articulated-body simulator.
///
/// Implementors own the simulation state exclusively. The state changes only
/// through [`step`](SimulationBackend::step) and
/// [`set_state`](SimulationBackend::set_state).
pub trait SimulationBackend {
    /// Number of generalized position coordinates.
    fn nq(&self) -> usize;

    /// Number of generalized velocity coordinates.
    fn nv(&self) -> usize;

    /// Number of actuator inputs.
    fn nu(&self) -> usize;

    /// Duration of one physics substep in seconds.
    fn timestep(&self) -> f32;

    fn state(&self) -> &SimulationState;

    /// Writes the actuator input buffer. Values persist until the next call
    /// and are applied on every substep.
    fn set_ctrl(&mut self, ctrl: &[f32]) -> Result<(), PhysicsError>;

    /// Advances the simulation by one substep.
    fn step(&mut self);

    /// Replaces positions and velocities as a whole and zeroes the control
    /// buffer. Derived quantities are stale until [`forward`](Self::forward).
    fn set_state(&mut self, qpos: &[f32], qvel: &[f32]) -> Result<(), PhysicsError>;

    /// Brings derived quantities in line with the current positions and
    /// velocities without advancing time.
    fn forward(&mut self);

    /// Drawable geometry at the current state.
    fn scene(&self) -> Vec<ScenePrimitive>;
}
