use serde::Serialize;

use crate::env::Env;
use crate::error::Result;
use crate::ml::{Action, Policy};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EpisodeSummary {
    pub total_reward: f64,
    pub length: usize,
    /// `false` when the episode hit the time limit instead.
    pub fell: bool,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct RolloutSummary {
    pub steps: usize,
    pub total_reward: f64,
    /// Finished episodes only.
    pub episodes: Vec<EpisodeSummary>,
}

impl RolloutSummary {
    pub fn mean_episode_reward(&self) -> Option<f64> {
        if self.episodes.is_empty() {
            return None;
        }
        let sum: f64 = self.episodes.iter().map(|e| e.total_reward).sum();
        Some(sum / self.episodes.len() as f64)
    }
}

/// Runs `policy` for `steps` environment steps, resetting whenever an episode
/// ends and rendering every step if the environment has a render mode.
pub fn rollout<E: Env>(
    env: &mut E,
    policy: &mut Policy,
    steps: usize,
    seed: Option<u64>,
) -> Result<RolloutSummary> {
    let mut summary = RolloutSummary::default();
    let (mut observation, _) = env.reset(seed, None)?;
    let mut episode_reward = 0.0;
    let mut episode_length = 0;

    for _ in 0..steps {
        let action = Action::from_slice(&policy.forward(observation.as_slice())?)?;
        let result = env.step(&action)?;
        if env.render_mode().is_some() {
            env.render()?;
        }

        summary.steps += 1;
        summary.total_reward += f64::from(result.reward);
        episode_reward += f64::from(result.reward);
        episode_length += 1;

        if result.done() {
            log::info!(
                "episode {} done: reward={:.3}, length={}, {}",
                summary.episodes.len(),
                episode_reward,
                episode_length,
                if result.terminated { "fell" } else { "time limit" }
            );
            summary.episodes.push(EpisodeSummary {
                total_reward: episode_reward,
                length: episode_length,
                fell: result.terminated,
            });
            episode_reward = 0.0;
            episode_length = 0;
            observation = env.reset(None, None)?.0;
        } else {
            observation = result.observation;
        }
    }

    Ok(summary)
}
