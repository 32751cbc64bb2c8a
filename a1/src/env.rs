use image::RgbImage;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use a1_physics::{PhysicsWorld, SimulationBackend, BASE_NQ, BASE_NV};

use crate::config::{A1Config, EnvConfig};
use crate::controller::PdController;
use crate::driver::StepDriver;
use crate::encoder::encode;
use crate::episode::{EpisodeClock, EpisodeManager};
use crate::error::{EnvError, Result};
use crate::ml::{Action, BoxSpace, Observation};
use crate::renderer::{DisplaySink, Viewer};
use crate::reward::{RewardEvaluator, RewardTerms};

/// Free-form per-step metadata. The environment itself always returns it empty.
pub type Info = serde_json::Map<String, serde_json::Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    /// `render` returns the frame.
    RgbArray,
    /// `render` hands the frame to the display sink and returns nothing.
    Human,
}

impl FromStr for RenderMode {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rgb_array" => Ok(Self::RgbArray),
            "human" => Ok(Self::Human),
            other => Err(EnvError::InvalidConfig(format!(
                "unknown render mode `{other}` (expected `rgb_array` or `human`)"
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct StepResult {
    pub observation: Observation,
    pub reward: f32,
    /// The robot fell; the episode cannot continue.
    pub terminated: bool,
    /// The time limit passed.
    pub truncated: bool,
    pub info: Info,
}

impl StepResult {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Agent/environment contract consumed by trainers and wrappers.
pub trait Env {
    fn observation_space(&self) -> &BoxSpace;

    fn action_space(&self) -> &BoxSpace;

    fn render_mode(&self) -> Option<RenderMode>;

    fn reset(&mut self, seed: Option<u64>, options: Option<&Info>) -> Result<(Observation, Info)>;

    fn step(&mut self, action: &Action) -> Result<StepResult>;

    fn render(&mut self) -> Result<Option<RgbImage>>;

    /// Releases the viewer, if any. Safe to call repeatedly.
    fn close(&mut self);
}

/// Unitree A1 locomotion task.
pub struct A1Env<B: SimulationBackend = PhysicsWorld> {
    sim: B,
    config: EnvConfig,
    controller: PdController,
    driver: StepDriver,
    reward: RewardEvaluator,
    episode: EpisodeManager,
    clock: EpisodeClock,
    observation_space: BoxSpace,
    action_space: BoxSpace,
    render_mode: Option<RenderMode>,
    viewer: Option<Viewer>,
    sink: Option<Box<dyn DisplaySink>>,
    rng: StdRng,
    last_terms: RewardTerms,
}

impl A1Env<PhysicsWorld> {
    /// Scene bundled with the crate.
    pub fn default_scene_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/a1.urdf")
    }

    pub fn from_urdf(
        path: impl AsRef<Path>,
        config: EnvConfig,
        render_mode: Option<RenderMode>,
    ) -> Result<Self> {
        config.validate()?;
        let world = PhysicsWorld::from_urdf_file(path.as_ref(), &config.physics)?;
        if world.joint_names().iter().map(String::as_str).ne(A1Config::JOINT_NAMES) {
            log::warn!(
                "scene joints {:?} differ from the A1 joint order; actions map by position",
                world.joint_names()
            );
        }
        Self::with_backend(world, config, render_mode)
    }
}

impl<B: SimulationBackend> A1Env<B> {
    /// Wraps an already constructed backend and resets it to the standing pose.
    pub fn with_backend(sim: B, config: EnvConfig, render_mode: Option<RenderMode>) -> Result<Self> {
        config.validate()?;

        let joints = A1Config::NUM_JOINTS;
        for (what, expected, got) in [
            ("actuators", joints, sim.nu()),
            ("position coordinates", BASE_NQ + joints, sim.nq()),
            ("velocity coordinates", BASE_NV + joints, sim.nv()),
        ] {
            if got != expected {
                return Err(EnvError::DimensionMismatch {
                    what,
                    expected,
                    got,
                });
            }
        }

        let mut env = Self {
            observation_space: BoxSpace::unbounded(sim.nq() + sim.nv()),
            action_space: BoxSpace::new(-1.0, 1.0, Action::SIZE),
            controller: PdController::new(&config.control, A1Config::REFERENCE_POSE),
            driver: StepDriver::new(config.frame_skip),
            reward: RewardEvaluator::new(config.reward.clone()),
            episode: EpisodeManager::new(
                config.reset_height,
                config.fall_height,
                config.max_episode_seconds,
                A1Config::REFERENCE_POSE,
            ),
            clock: EpisodeClock::default(),
            render_mode,
            viewer: None,
            sink: None,
            rng: StdRng::from_os_rng(),
            last_terms: RewardTerms::default(),
            sim,
            config,
        };
        env.episode.reset(&mut env.sim, &mut env.clock)?;

        log::info!(
            "A1 environment ready: obs_dim={}, act_dim={}, dt={}s x {} substeps, render_mode={:?}",
            env.observation_space.dim(),
            env.action_space.dim(),
            env.sim.timestep(),
            env.config.frame_skip,
            env.render_mode
        );
        Ok(env)
    }

    /// Frames rendered in `human` mode go to `sink`.
    pub fn set_display_sink(&mut self, sink: Box<dyn DisplaySink>) {
        self.sink = Some(sink);
    }

    pub fn with_display_sink(mut self, sink: Box<dyn DisplaySink>) -> Self {
        self.set_display_sink(sink);
        self
    }

    /// Uniform action from the environment RNG (re-seeded by `reset`).
    pub fn sample_action(&mut self) -> Action {
        self.action_space
            .sample(&mut self.rng)
            .and_then(|values| Action::from_slice(&values).ok())
            .unwrap_or_else(Action::zero)
    }

    pub fn backend(&self) -> &B {
        &self.sim
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.sim
    }

    pub fn config(&self) -> &EnvConfig {
        &self.config
    }

    pub fn controller(&self) -> &PdController {
        &self.controller
    }

    pub fn clock(&self) -> &EpisodeClock {
        &self.clock
    }

    /// Reward breakdown of the most recent step.
    pub fn last_reward_terms(&self) -> RewardTerms {
        self.last_terms
    }

    pub fn has_viewer(&self) -> bool {
        self.viewer.is_some()
    }

    /// Current observation without stepping.
    pub fn observe(&self) -> Observation {
        encode(self.sim.state())
    }
}

impl<B: SimulationBackend> Env for A1Env<B> {
    fn observation_space(&self) -> &BoxSpace {
        &self.observation_space
    }

    fn action_space(&self) -> &BoxSpace {
        &self.action_space
    }

    fn render_mode(&self) -> Option<RenderMode> {
        self.render_mode
    }

    fn reset(&mut self, seed: Option<u64>, options: Option<&Info>) -> Result<(Observation, Info)> {
        if let Some(seed) = seed {
            self.rng = StdRng::seed_from_u64(seed);
        }
        if options.is_some_and(|o| !o.is_empty()) {
            log::debug!("reset options are ignored");
        }

        self.episode.reset(&mut self.sim, &mut self.clock)?;
        self.last_terms = RewardTerms::default();
        log::debug!("episode reset (seed={:?})", seed);

        Ok((self.observe(), Info::new()))
    }

    fn step(&mut self, action: &Action) -> Result<StepResult> {
        // 1. PD torques from the pre-step state
        let torques = self.controller.torques(action, self.sim.state());
        self.sim.set_ctrl(&torques)?;

        // 2. Physics substeps
        self.driver.advance(&mut self.sim, &mut self.clock);

        // 3. Observation, reward, episode signals
        let state = self.sim.state();
        let observation = encode(state);
        self.last_terms = self.reward.terms(state);
        let terminated = self.episode.is_terminated(state);
        let truncated = self.episode.is_truncated(&self.clock);

        if terminated || truncated {
            log::debug!(
                "episode ended at t={:.3}s (terminated={}, truncated={}, height={:.3})",
                self.clock.elapsed(),
                terminated,
                truncated,
                state.base_height()
            );
        }

        Ok(StepResult {
            observation,
            reward: self.last_terms.total(),
            terminated,
            truncated,
            info: Info::new(),
        })
    }

    fn render(&mut self) -> Result<Option<RgbImage>> {
        let Some(mode) = self.render_mode else {
            log::warn!("render() called but no render mode was set; pass `rgb_array` or `human`");
            return Ok(None);
        };

        let render_config = &self.config.render;
        let viewer = self
            .viewer
            .get_or_insert_with(|| Viewer::new(render_config));
        let frame = viewer.render(&self.sim.scene(), Some(self.sim.state().base_position()));

        match mode {
            RenderMode::RgbArray => Ok(Some(frame)),
            RenderMode::Human => {
                match self.sink.as_mut() {
                    Some(sink) => sink.show(&frame)?,
                    None => log::warn!("human render mode without a display sink; frame dropped"),
                }
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        if self.viewer.take().is_some() {
            log::debug!("viewer released");
            if let Some(sink) = self.sink.as_mut() {
                sink.close();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockBackend;
    use std::sync::{Arc, Mutex};

    fn mock_env(render_mode: Option<RenderMode>) -> A1Env<MockBackend> {
        let mut config = EnvConfig::default();
        config.render.width = 48;
        config.render.height = 32;
        A1Env::with_backend(MockBackend::new(), config, render_mode).unwrap()
    }

    #[derive(Clone, Default)]
    struct CountingSink {
        shown: Arc<Mutex<usize>>,
        closed: Arc<Mutex<usize>>,
    }

    impl DisplaySink for CountingSink {
        fn show(&mut self, frame: &RgbImage) -> Result<()> {
            assert_eq!(frame.dimensions(), (48, 32));
            *self.shown.lock().unwrap() += 1;
            Ok(())
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() += 1;
        }
    }

    #[test]
    fn reset_returns_standing_observation() {
        let mut env = mock_env(None);
        env.backend_mut().state.qpos[2] = 0.9;
        env.backend_mut().state.qvel[0] = 1.0;

        let (obs, info) = env.reset(Some(0), None).unwrap();
        assert!(info.is_empty());
        assert_eq!(obs.len(), env.observation_space().dim());
        assert_eq!(obs.base_height(), 0.30);
        assert!(obs.values[19..].iter().all(|&v| v == 0.0));
        assert_eq!(&obs.values[7..19], &A1Config::REFERENCE_POSE);
        assert_eq!(env.clock().elapsed(), 0.0);
    }

    #[test]
    fn spaces_match_model() {
        let env = mock_env(None);
        assert_eq!(env.observation_space().shape(), [37]);
        assert_eq!(env.action_space().shape(), [12]);
        assert_eq!(env.action_space().low, -1.0);
        assert_eq!(env.action_space().high, 1.0);
    }

    #[test]
    fn step_applies_controller_and_substeps() {
        let mut env = mock_env(None);
        env.reset(None, None).unwrap();
        let action = Action::from_slice(&[1.0; 12]).unwrap();

        let result = env.step(&action).unwrap();

        assert_eq!(result.observation.len(), 37);
        assert_eq!(env.backend().step_calls, 5);
        assert!((env.clock().elapsed() - 0.01).abs() < 1e-6);
        // 15 * 0.05 = 0.75 N·m on every joint
        assert!(env.backend().state.ctrl.iter().all(|&u| (u - 0.75).abs() < 1e-5));
        assert!(!result.terminated && !result.truncated);
        assert!(result.info.is_empty());
        // Height bonus minus energy
        assert!((result.reward - (1.0 - 0.001 * 12.0 * 0.75 * 0.75)).abs() < 1e-5);
        assert_eq!(result.reward, env.last_reward_terms().total());
    }

    #[test]
    fn forced_fall_terminates() {
        let mut env = mock_env(None);
        env.reset(None, None).unwrap();
        env.backend_mut().state.qpos[2] = 0.10;

        let result = env.step(&Action::zero()).unwrap();
        assert!(result.terminated);
        assert!(!result.truncated);
        assert_eq!(env.last_reward_terms().height, -1.0);
    }

    #[test]
    fn truncates_on_step_crossing_time_limit() {
        let mut env = mock_env(None);
        env.reset(None, None).unwrap();

        let mut steps = 0;
        loop {
            let result = env.step(&Action::zero()).unwrap();
            steps += 1;
            assert!(!result.terminated);
            if result.truncated {
                break;
            }
            assert!(steps < 1000, "never truncated");
        }
        assert!(env.clock().elapsed() > 5.0);
        assert!((500..=501).contains(&steps), "{steps}");
    }

    #[test]
    fn truncation_reported_alongside_termination() {
        let mut env = mock_env(None);
        env.reset(None, None).unwrap();
        env.backend_mut().sink_rate = 0.01;

        let mut last = env.step(&Action::zero()).unwrap();
        while !last.truncated {
            last = env.step(&Action::zero()).unwrap();
        }
        assert!(last.terminated);
        assert!(last.truncated);
    }

    #[test]
    fn reset_clears_clock_once_per_call() {
        let mut env = mock_env(None);
        for _ in 0..3 {
            env.step(&Action::zero()).unwrap();
        }
        assert!(env.clock().elapsed() > 0.0);
        env.reset(None, None).unwrap();
        assert_eq!(env.clock().elapsed(), 0.0);
    }

    #[test]
    fn rejects_model_with_wrong_actuator_count() {
        let err = A1Env::with_backend(MockBackend::with_joints(8), EnvConfig::default(), None)
            .err()
            .unwrap();
        assert!(matches!(
            err,
            EnvError::DimensionMismatch {
                what: "actuators",
                expected: 12,
                got: 8
            }
        ));
    }

    #[test]
    fn rejects_invalid_config() {
        let config = EnvConfig {
            frame_skip: 0,
            ..EnvConfig::default()
        };
        assert!(A1Env::with_backend(MockBackend::new(), config, None).is_err());
    }

    #[test]
    fn render_without_mode_creates_no_viewer() {
        let mut env = mock_env(None);
        assert!(env.render().unwrap().is_none());
        assert!(!env.has_viewer());
    }

    #[test]
    fn rgb_array_render_is_lazy_and_close_is_idempotent() {
        let mut env = mock_env(Some(RenderMode::RgbArray));
        assert!(!env.has_viewer());

        let frame = env.render().unwrap().unwrap();
        assert_eq!(frame.dimensions(), (48, 32));
        assert!(env.has_viewer());

        env.close();
        assert!(!env.has_viewer());
        env.close();
        assert!(!env.has_viewer());

        // A new viewer is created on demand after close
        assert!(env.render().unwrap().is_some());
    }

    #[test]
    fn human_mode_delegates_to_sink() {
        let sink = CountingSink::default();
        let mut env = mock_env(Some(RenderMode::Human)).with_display_sink(Box::new(sink.clone()));

        assert!(env.render().unwrap().is_none());
        assert!(env.render().unwrap().is_none());
        assert_eq!(*sink.shown.lock().unwrap(), 2);

        env.close();
        env.close();
        assert_eq!(*sink.closed.lock().unwrap(), 1);
    }

    #[test]
    fn seeded_reset_makes_sampling_reproducible() {
        let mut env = mock_env(None);
        env.reset(Some(42), None).unwrap();
        let first = env.sample_action();
        env.reset(Some(42), None).unwrap();
        assert_eq!(first, env.sample_action());
        assert!(env.action_space().contains(&first.values));
    }

    #[test]
    fn render_mode_parsing() {
        assert_eq!("human".parse::<RenderMode>().unwrap(), RenderMode::Human);
        assert_eq!("rgb_array".parse::<RenderMode>().unwrap(), RenderMode::RgbArray);
        assert!("window".parse::<RenderMode>().is_err());
    }
}
