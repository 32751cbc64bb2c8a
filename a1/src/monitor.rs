//! Episode statistics wrapper.
//!
//! Tracks return, length and wall-clock time of each episode. When an episode
//! ends the step info gains an `"episode": {"r", "l", "t"}` entry, and with a
//! log file attached a row is appended to a CSV whose first line is a JSON
//! header (`#{"t_start": ..., "env_id": ...}`), the layout common RL tooling
//! reads back as `monitor.csv`.

use image::RgbImage;
use serde::Serialize;
use serde_json::json;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::env::{Env, Info, RenderMode, StepResult};
use crate::error::{EnvError, Result};
use crate::ml::{Action, BoxSpace, Observation};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct EpisodeStats {
    /// Undiscounted return.
    #[serde(rename = "r")]
    pub reward: f64,
    #[serde(rename = "l")]
    pub length: usize,
    /// Wall-clock seconds since the monitor was created.
    #[serde(rename = "t")]
    pub time: f64,
}

pub struct Monitor<E: Env> {
    env: E,
    start: Instant,
    episode_reward: f64,
    episode_length: usize,
    episodes: Vec<EpisodeStats>,
    log: Option<BufWriter<File>>,
}

impl<E: Env> Monitor<E> {
    pub fn new(env: E) -> Self {
        Self {
            env,
            start: Instant::now(),
            episode_reward: 0.0,
            episode_length: 0,
            episodes: Vec::new(),
            log: None,
        }
    }

    /// Also appends one CSV row per finished episode to `path`.
    pub fn with_log_file(env: E, path: impl AsRef<Path>, env_id: &str) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| EnvError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut log = BufWriter::new(file);

        let t_start = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let header = json!({ "t_start": t_start, "env_id": env_id });
        writeln!(log, "#{header}").map_err(EnvError::Monitor)?;
        writeln!(log, "r,l,t").map_err(EnvError::Monitor)?;
        log.flush().map_err(EnvError::Monitor)?;

        log::info!("monitoring episodes to {}", path.display());
        Ok(Self {
            log: Some(log),
            ..Self::new(env)
        })
    }

    pub fn episodes(&self) -> &[EpisodeStats] {
        &self.episodes
    }

    pub fn inner(&self) -> &E {
        &self.env
    }

    pub fn inner_mut(&mut self) -> &mut E {
        &mut self.env
    }

    pub fn into_inner(self) -> E {
        self.env
    }

    fn finish_episode(&mut self, info: &mut Info) -> Result<()> {
        let stats = EpisodeStats {
            reward: self.episode_reward,
            length: self.episode_length,
            time: self.start.elapsed().as_secs_f64(),
        };
        info.insert(
            "episode".to_string(),
            json!({ "r": stats.reward, "l": stats.length, "t": stats.time }),
        );
        if let Some(log) = self.log.as_mut() {
            writeln!(log, "{:.6},{},{:.6}", stats.reward, stats.length, stats.time)
                .and_then(|_| log.flush())
                .map_err(EnvError::Monitor)?;
        }
        log::debug!(
            "episode {} finished: return={:.3}, length={}",
            self.episodes.len(),
            stats.reward,
            stats.length
        );
        self.episodes.push(stats);
        Ok(())
    }
}

impl<E: Env> Env for Monitor<E> {
    fn observation_space(&self) -> &BoxSpace {
        self.env.observation_space()
    }

    fn action_space(&self) -> &BoxSpace {
        self.env.action_space()
    }

    fn render_mode(&self) -> Option<RenderMode> {
        self.env.render_mode()
    }

    fn reset(&mut self, seed: Option<u64>, options: Option<&Info>) -> Result<(Observation, Info)> {
        self.episode_reward = 0.0;
        self.episode_length = 0;
        self.env.reset(seed, options)
    }

    fn step(&mut self, action: &Action) -> Result<StepResult> {
        let mut result = self.env.step(action)?;
        self.episode_reward += f64::from(result.reward);
        self.episode_length += 1;
        if result.done() {
            self.finish_episode(&mut result.info)?;
        }
        Ok(result)
    }

    fn render(&mut self) -> Result<Option<RgbImage>> {
        self.env.render()
    }

    fn close(&mut self) {
        self.env.close();
    }
}
