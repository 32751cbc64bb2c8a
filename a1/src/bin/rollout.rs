//! Run a policy in the A1 environment.
//!
//! Usage:
//!   cargo run --bin a1-rollout -- --steps 1000
//!   cargo run --bin a1-rollout -- --policy policy.onnx --frames-dir frames/
//!   cargo run --bin a1-rollout -- --random --seed 3 --monitor logs/monitor.csv

use std::path::PathBuf;

use a1_env::rollout::rollout;
use a1_env::{A1Env, Action, Env, EnvConfig, Monitor, PngSequenceSink, Policy, RenderMode};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "a1-rollout")]
#[command(about = "Roll out a policy in the Unitree A1 environment")]
struct Args {
    /// URDF scene (defaults to the bundled A1 model)
    #[arg(long)]
    scene: Option<PathBuf>,

    /// JSON environment config; missing fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Exported ONNX policy (observation -> action)
    #[arg(long, conflicts_with = "random")]
    policy: Option<PathBuf>,

    /// Uniform random actions instead of holding the standing pose
    #[arg(long)]
    random: bool,

    /// Number of environment steps
    #[arg(long, default_value_t = 1000)]
    steps: usize,

    #[arg(long)]
    seed: Option<u64>,

    /// Render every step as PNG frames into this directory
    #[arg(long)]
    frames_dir: Option<PathBuf>,

    /// Write per-episode statistics to this CSV file
    #[arg(long)]
    monitor: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EnvConfig::from_file(path)?,
        None => EnvConfig::default(),
    };
    let scene = args.scene.clone().unwrap_or_else(A1Env::default_scene_path);
    let render_mode = args.frames_dir.as_ref().map(|_| RenderMode::Human);

    let mut env = A1Env::from_urdf(&scene, config, render_mode)?;
    if let Some(dir) = &args.frames_dir {
        env.set_display_sink(Box::new(PngSequenceSink::new(dir)?));
    }

    let obs_dim = env.observe().len();
    let mut policy = match (&args.policy, args.random) {
        (Some(path), _) => Policy::from_onnx_file(path, obs_dim, Action::SIZE)?,
        (None, true) => Policy::random(obs_dim, Action::SIZE, args.seed),
        (None, false) => Policy::standing(obs_dim, Action::SIZE),
    };

    let summary = match &args.monitor {
        Some(path) => {
            let mut monitored = Monitor::with_log_file(env, path, "UnitreeA1")?;
            let summary = rollout(&mut monitored, &mut policy, args.steps, args.seed)?;
            monitored.close();
            summary
        }
        None => {
            let summary = rollout(&mut env, &mut policy, args.steps, args.seed)?;
            env.close();
            summary
        }
    };

    log::info!(
        "{} steps, {} finished episodes, total reward {:.3}",
        summary.steps,
        summary.episodes.len(),
        summary.total_reward
    );
    if let Some(mean) = summary.mean_episode_reward() {
        log::info!("mean episode reward {:.3}", mean);
    }
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
