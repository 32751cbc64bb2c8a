use a1_physics::{SimulationBackend, SimulationState};

use crate::error::Result;

/// Simulated seconds since the last reset. Never negative, never decreases
/// within an episode.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EpisodeClock {
    elapsed: f64,
}

impl EpisodeClock {
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn advance(&mut self, dt: f64) {
        self.elapsed += dt.max(0.0);
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }
}

/// Fall detection, time limit and the canonical initial state.
#[derive(Clone, Debug)]
pub struct EpisodeManager {
    pub reset_height: f32,
    pub fall_height: f32,
    pub max_seconds: f64,
    reference: [f32; 12],
}

impl EpisodeManager {
    pub fn new(reset_height: f32, fall_height: f32, max_seconds: f64, reference: [f32; 12]) -> Self {
        Self {
            reset_height,
            fall_height,
            max_seconds,
            reference,
        }
    }

    /// Base at `reset_height`, joints at the reference pose, at rest.
    pub fn initial_state(&self, nq: usize, nv: usize) -> Result<SimulationState> {
        Ok(SimulationState::standing(
            nq,
            nv,
            self.reset_height,
            &self.reference,
        )?)
    }

    /// Installs the initial state, runs the consistency pass and zeroes the clock.
    pub fn reset<B: SimulationBackend>(&self, sim: &mut B, clock: &mut EpisodeClock) -> Result<()> {
        let initial = self.initial_state(sim.nq(), sim.nv())?;
        sim.set_state(&initial.qpos, &initial.qvel)?;
        sim.forward();
        clock.reset();
        Ok(())
    }

    pub fn is_terminated(&self, state: &SimulationState) -> bool {
        state.base_height() < self.fall_height
    }

    pub fn is_truncated(&self, clock: &EpisodeClock) -> bool {
        clock.elapsed() > self.max_seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::A1Config;
    use crate::testing::MockBackend;

    fn manager() -> EpisodeManager {
        EpisodeManager::new(0.30, 0.15, 5.0, A1Config::REFERENCE_POSE)
    }

    #[test]
    fn clock_accumulates_and_resets() {
        let mut clock = EpisodeClock::default();
        clock.advance(0.002);
        clock.advance(0.002);
        assert!((clock.elapsed() - 0.004).abs() < 1e-12);
        clock.advance(-1.0);
        assert!((clock.elapsed() - 0.004).abs() < 1e-12);
        clock.reset();
        assert_eq!(clock.elapsed(), 0.0);
    }

    #[test]
    fn reset_installs_standing_state() {
        let mut sim = MockBackend::new();
        sim.state.qpos[0] = 3.0;
        sim.state.qvel[7] = 2.0;
        let mut clock = EpisodeClock::default();
        clock.advance(1.0);

        manager().reset(&mut sim, &mut clock).unwrap();

        assert_eq!(clock.elapsed(), 0.0);
        assert_eq!(sim.state.base_position(), [0.0, 0.0, 0.30]);
        assert_eq!(sim.state.joint_positions(), &A1Config::REFERENCE_POSE);
        assert!(sim.state.qvel.iter().all(|&v| v == 0.0));
        assert_eq!(sim.forward_calls, 1);
    }

    #[test]
    fn fall_and_time_limit() {
        let m = manager();
        let mut state = SimulationState::zeros(19, 18, 12);
        state.qpos[2] = 0.10;
        assert!(m.is_terminated(&state));
        state.qpos[2] = 0.15;
        assert!(!m.is_terminated(&state));

        let mut clock = EpisodeClock::default();
        clock.advance(5.0);
        assert!(!m.is_truncated(&clock));
        clock.advance(0.002);
        assert!(m.is_truncated(&clock));
    }
}
