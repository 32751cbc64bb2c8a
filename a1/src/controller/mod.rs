use a1_physics::SimulationState;

use crate::config::ControlConfig;
use crate::ml::Action;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PdGains {
    pub kp: f32,
    pub kd: f32,
}

/// Joint-space PD controller around a fixed reference pose.
///
/// The policy's action perturbs the reference pose (`target = ref + scale * a`)
/// and the resulting torques are clipped to `[-torque_limit, torque_limit]`.
#[derive(Clone, Debug)]
pub struct PdController {
    pub gains: PdGains,
    pub action_scale: f32,
    pub torque_limit: f32,
    reference: [f32; 12],
}

impl PdController {
    pub fn new(config: &ControlConfig, reference: [f32; 12]) -> Self {
        Self {
            gains: PdGains {
                kp: config.kp,
                kd: config.kd,
            },
            action_scale: config.action_scale,
            torque_limit: config.torque_limit,
            reference,
        }
    }

    pub fn reference(&self) -> &[f32; 12] {
        &self.reference
    }

    /// Joint angle targets for `action`.
    pub fn targets(&self, action: &Action) -> [f32; 12] {
        let mut targets = self.reference;
        for (target, a) in targets.iter_mut().zip(action.values) {
            *target += self.action_scale * a;
        }
        targets
    }

    /// Clipped joint torques for `action` at the current joint state.
    pub fn torques(&self, action: &Action, state: &SimulationState) -> [f32; 12] {
        let targets = self.targets(action);
        let q = state.joint_positions();
        let qd = state.joint_velocities();

        let mut torques = [0.0; 12];
        for i in 0..12 {
            let tau = self.gains.kp * (targets[i] - q[i]) - self.gains.kd * qd[i];
            torques[i] = tau.clamp(-self.torque_limit, self.torque_limit);
        }
        torques
    }
}
