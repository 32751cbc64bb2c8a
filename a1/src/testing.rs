//! Deterministic stand-in for the physics backend.

use a1_physics::{
    PhysicsError, PrimitiveShape, ScenePrimitive, SimulationBackend, SimulationState,
};
use nalgebra as na;

pub struct MockBackend {
    pub state: SimulationState,
    pub timestep: f32,
    /// Base height lost per substep.
    pub sink_rate: f32,
    pub step_calls: usize,
    pub forward_calls: usize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: SimulationState::zeros(19, 18, 12),
            timestep: 0.002,
            sink_rate: 0.0,
            step_calls: 0,
            forward_calls: 0,
        }
    }

    /// Model with a different actuator count, for dimension checks.
    pub fn with_joints(n: usize) -> Self {
        Self {
            state: SimulationState::zeros(7 + n, 6 + n, n),
            ..Self::new()
        }
    }
}

impl SimulationBackend for MockBackend {
    fn nq(&self) -> usize {
        self.state.qpos.len()
    }

    fn nv(&self) -> usize {
        self.state.qvel.len()
    }

    fn nu(&self) -> usize {
        self.state.ctrl.len()
    }

    fn timestep(&self) -> f32 {
        self.timestep
    }

    fn state(&self) -> &SimulationState {
        &self.state
    }

    fn set_ctrl(&mut self, ctrl: &[f32]) -> Result<(), PhysicsError> {
        if ctrl.len() != self.nu() {
            return Err(PhysicsError::StateDimension {
                what: "ctrl",
                expected: self.nu(),
                got: ctrl.len(),
            });
        }
        self.state.ctrl.copy_from_slice(ctrl);
        Ok(())
    }

    fn step(&mut self) {
        self.step_calls += 1;
        self.state.qpos[2] -= self.sink_rate;
    }

    fn set_state(&mut self, qpos: &[f32], qvel: &[f32]) -> Result<(), PhysicsError> {
        if qpos.len() != self.nq() || qvel.len() != self.nv() {
            return Err(PhysicsError::StateDimension {
                what: "state",
                expected: self.nq() + self.nv(),
                got: qpos.len() + qvel.len(),
            });
        }
        self.state.qpos.copy_from_slice(qpos);
        self.state.qvel.copy_from_slice(qvel);
        self.state.ctrl.iter_mut().for_each(|c| *c = 0.0);
        Ok(())
    }

    fn forward(&mut self) {
        self.forward_calls += 1;
    }

    fn scene(&self) -> Vec<ScenePrimitive> {
        let [x, y, z] = self.state.base_position();
        vec![ScenePrimitive {
            shape: PrimitiveShape::Cuboid {
                half_extents: [0.13, 0.1, 0.06],
            },
            pose: na::Isometry3::translation(x, y, z),
            color: [230, 110, 30],
        }]
    }
}
