//! Generalized coordinates of a floating-base articulated body.
//!
//! Layout (Z up):
//! - `qpos = [x, y, z, qw, qx, qy, qz, q_1 .. q_n]`
//! - `qvel = [vx, vy, vz, wx, wy, wz, qd_1 .. qd_n]`
//!
//! The base angular velocity is expressed in the base frame.

use crate::error::PhysicsError;

/// Position coordinates of the free base (translation + unit quaternion).
pub const BASE_NQ: usize = 7;
/// Velocity coordinates of the free base (linear + angular).
pub const BASE_NV: usize = 6;

#[derive(Clone, Debug, PartialEq)]
pub struct SimulationState {
    pub qpos: Vec<f32>,
    pub qvel: Vec<f32>,
    /// Actuator inputs last written to the backend (one per actuated joint).
    pub ctrl: Vec<f32>,
}

impl SimulationState {
    /// All-zero state, except for an identity base orientation.
    pub fn zeros(nq: usize, nv: usize, nu: usize) -> Self {
        let mut qpos = vec![0.0; nq];
        if nq >= BASE_NQ {
            qpos[3] = 1.0;
        }
        Self {
            qpos,
            qvel: vec![0.0; nv],
            ctrl: vec![0.0; nu],
        }
    }

    /// Builds a resting state: base at `(0, 0, height)` with identity orientation,
    /// joints at `pose`, every velocity and control input zero.
    pub fn standing(
        nq: usize,
        nv: usize,
        height: f32,
        pose: &[f32],
    ) -> Result<Self, PhysicsError> {
        if nq != BASE_NQ + pose.len() {
            return Err(PhysicsError::StateDimension {
                what: "joint pose",
                expected: nq.saturating_sub(BASE_NQ),
                got: pose.len(),
            });
        }
        let mut qpos = vec![0.0; nq];
        qpos[2] = height;
        qpos[3] = 1.0;
        qpos[BASE_NQ..].copy_from_slice(pose);

        Ok(Self {
            qpos,
            qvel: vec![0.0; nv],
            ctrl: vec![0.0; pose.len()],
        })
    }

    pub fn base_position(&self) -> [f32; 3] {
        [self.qpos[0], self.qpos[1], self.qpos[2]]
    }

    pub fn base_height(&self) -> f32 {
        self.qpos[2]
    }

    /// Base orientation as `[w, x, y, z]`.
    pub fn base_orientation(&self) -> [f32; 4] {
        [self.qpos[3], self.qpos[4], self.qpos[5], self.qpos[6]]
    }

    pub fn base_linear_velocity(&self) -> [f32; 3] {
        [self.qvel[0], self.qvel[1], self.qvel[2]]
    }

    pub fn base_angular_velocity(&self) -> [f32; 3] {
        [self.qvel[3], self.qvel[4], self.qvel[5]]
    }

    pub fn joint_positions(&self) -> &[f32] {
        &self.qpos[BASE_NQ..]
    }

    pub fn joint_velocities(&self) -> &[f32] {
        &self.qvel[BASE_NV..]
    }
}
