use a1_physics::SimulationBackend;

use crate::episode::EpisodeClock;

/// Advances physics by a fixed number of substeps per environment step.
#[derive(Clone, Copy, Debug)]
pub struct StepDriver {
    pub frame_skip: usize,
}

impl StepDriver {
    pub fn new(frame_skip: usize) -> Self {
        Self { frame_skip }
    }

    /// Runs `frame_skip` substeps; the clock accrues one backend timestep per substep.
    pub fn advance<B: SimulationBackend>(&self, sim: &mut B, clock: &mut EpisodeClock) {
        let dt = f64::from(sim.timestep());
        for _ in 0..self.frame_skip {
            sim.step();
            clock.advance(dt);
        }
    }

    /// Simulated seconds covered by one environment step.
    pub fn step_duration<B: SimulationBackend>(&self, sim: &B) -> f64 {
        f64::from(sim.timestep()) * self.frame_skip as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;

    #[test]
    fn runs_substeps_and_accrues_time() {
        let mut sim = MockBackend::new();
        let mut clock = EpisodeClock::default();
        let driver = StepDriver::new(5);

        driver.advance(&mut sim, &mut clock);
        assert_eq!(sim.step_calls, 5);
        assert!((clock.elapsed() - 0.01).abs() < 1e-9);

        driver.advance(&mut sim, &mut clock);
        assert_eq!(sim.step_calls, 10);
        assert!((clock.elapsed() - 2.0 * driver.step_duration(&sim)).abs() < 1e-9);
    }
}
