//! Multi-term locomotion reward.
//!
//! Every term is a pure function of the simulation state; the step reward is
//! their unnormalized sum.

use serde::Serialize;

use a1_physics::SimulationState;

use crate::config::RewardConfig;

/// Per-term breakdown of one reward evaluation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct RewardTerms {
    pub forward: f32,
    /// Always exactly `+1.0` or `-1.0`.
    pub height: f32,
    pub balance: f32,
    pub vertical_velocity: f32,
    /// Never positive.
    pub energy: f32,
}

impl RewardTerms {
    pub fn total(&self) -> f32 {
        self.forward + self.height + self.balance + self.vertical_velocity + self.energy
    }
}

#[derive(Clone, Debug)]
pub struct RewardEvaluator {
    config: RewardConfig,
}

impl RewardEvaluator {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, state: &SimulationState) -> f32 {
        self.terms(state).total()
    }

    pub fn terms(&self, state: &SimulationState) -> RewardTerms {
        let c = &self.config;
        let [vx, _, vz] = state.base_linear_velocity();
        let (roll, pitch) = roll_pitch(state.base_orientation());

        let z = state.base_height();
        let [low, high] = c.height_band;
        let height = if z > low && z < high { 1.0 } else { -1.0 };

        let effort: f32 = state.ctrl.iter().map(|u| u * u).sum();

        RewardTerms {
            forward: c.forward_weight * vx,
            height,
            balance: -c.balance_weight * (roll.abs() + pitch.abs()),
            vertical_velocity: -c.vertical_velocity_weight * vz.abs(),
            energy: -c.energy_weight * effort,
        }
    }
}

/// Roll and pitch (radians) of a `[w, x, y, z]` quaternion.
///
/// The arcsine argument is clamped to `[-1, 1]` so slightly non-unit
/// quaternions yield ±pi/2 instead of NaN.
pub fn roll_pitch(q: [f32; 4]) -> (f32, f32) {
    let [w, x, y, z] = q;
    let roll = (2.0 * (w * x + y * z)).atan2(1.0 - 2.0 * (x * x + y * y));
    let pitch = (2.0 * (w * y - z * x)).clamp(-1.0, 1.0).asin();
    (roll, pitch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra as na;

    fn upright(height: f32) -> SimulationState {
        let mut state = SimulationState::zeros(19, 18, 12);
        state.qpos[2] = height;
        state
    }

    fn evaluator() -> RewardEvaluator {
        RewardEvaluator::new(RewardConfig::default())
    }

    fn quat(q: na::UnitQuaternion<f32>) -> [f32; 4] {
        [q.w, q.i, q.j, q.k]
    }

    #[test]
    fn upright_standing_still_scores_height_bonus_only() {
        let terms = evaluator().terms(&upright(0.3));
        assert_eq!(terms.height, 1.0);
        assert_eq!(terms.forward, 0.0);
        assert_eq!(terms.balance, 0.0);
        assert_eq!(terms.vertical_velocity, 0.0);
        assert_eq!(terms.energy, 0.0);
        assert_eq!(terms.total(), 1.0);
    }

    #[test]
    fn height_band_is_strict() {
        let eval = evaluator();
        for (z, expected) in [(0.25, -1.0), (0.35, -1.0), (0.2501, 1.0), (0.1, -1.0), (0.5, -1.0)] {
            assert_eq!(eval.terms(&upright(z)).height, expected, "z = {z}");
        }
    }

    #[test]
    fn configurable_band() {
        let eval = RewardEvaluator::new(RewardConfig {
            height_band: [0.4, 0.6],
            ..RewardConfig::default()
        });
        assert_eq!(eval.terms(&upright(0.3)).height, -1.0);
        assert_eq!(eval.terms(&upright(0.5)).height, 1.0);
    }

    #[test]
    fn weighted_terms() {
        let mut state = upright(0.3);
        state.qvel[0] = 0.8;
        state.qvel[2] = -0.5;
        state.ctrl.iter_mut().for_each(|u| *u = 2.0);

        let terms = evaluator().terms(&state);
        assert!((terms.forward - 0.8).abs() < 1e-6);
        assert!((terms.vertical_velocity + 1.0).abs() < 1e-6);
        // 12 joints * 4.0 * 0.001
        assert!((terms.energy + 0.048).abs() < 1e-6);
        assert!((evaluator().evaluate(&state) - (0.8 + 1.0 - 1.0 - 0.048)).abs() < 1e-5);
    }

    #[test]
    fn tilt_is_penalized() {
        let mut state = upright(0.3);
        let tilt = na::UnitQuaternion::from_euler_angles(0.1, -0.2, 0.0);
        state.qpos[3..7].copy_from_slice(&quat(tilt));

        let terms = evaluator().terms(&state);
        assert!((terms.balance + 3.0 * 0.3).abs() < 1e-4, "{}", terms.balance);
    }

    #[test]
    fn roll_pitch_recovers_euler_angles() {
        let (roll, pitch) = roll_pitch(quat(na::UnitQuaternion::from_euler_angles(0.3, 0.2, 1.0)));
        assert!((roll - 0.3).abs() < 1e-5);
        assert!((pitch - 0.2).abs() < 1e-5);
    }

    #[test]
    fn roll_pitch_survives_non_unit_quaternion() {
        let (_, pitch) = roll_pitch([0.8, 0.0, 0.8, 0.0]);
        assert!(pitch.is_finite());
    }

    #[test]
    fn evaluation_is_idempotent() {
        let mut state = upright(0.28);
        state.qvel[0] = 0.3;
        state.ctrl[4] = -1.2;
        let eval = evaluator();
        assert_eq!(eval.evaluate(&state), eval.evaluate(&state));
    }
}
