use serde::{Deserialize, Serialize};
use std::path::Path;

use a1_physics::PhysicsConfig;

use crate::error::{EnvError, Result};

pub struct A1Config;

impl A1Config {
    pub const NUM_JOINTS: usize = 12;

    // Standing pose (hip, thigh, calf) per leg, FR, FL, RR, RL
    pub const REFERENCE_POSE: [f32; 12] = [
        0.2, -0.9, 1.5, // FR
        0.2, -0.9, 1.5, // FL
        0.2, -0.9, 1.5, // RR
        0.2, -0.9, 1.5, // RL
    ];

    /// Actuated joints in action/observation order.
    pub const JOINT_NAMES: [&'static str; 12] = [
        "FR_hip_joint",
        "FR_thigh_joint",
        "FR_calf_joint",
        "FL_hip_joint",
        "FL_thigh_joint",
        "FL_calf_joint",
        "RR_hip_joint",
        "RR_thigh_joint",
        "RR_calf_joint",
        "RL_hip_joint",
        "RL_thigh_joint",
        "RL_calf_joint",
    ];
}

/// PD controller parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Radians of target offset per unit of action.
    pub action_scale: f32,
    pub kp: f32,
    pub kd: f32,
    /// Symmetric torque clip, N·m.
    pub torque_limit: f32,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            action_scale: 0.05,
            kp: 15.0,
            kd: 0.5,
            torque_limit: 2.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub forward_weight: f32,
    /// Open interval of base heights that earns the standing bonus.
    pub height_band: [f32; 2],
    pub balance_weight: f32,
    pub vertical_velocity_weight: f32,
    pub energy_weight: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            forward_weight: 1.0,
            height_band: [0.25, 0.35],
            balance_weight: 3.0,
            vertical_velocity_weight: 2.0,
            energy_weight: 0.001,
        }
    }
}

/// Offscreen viewer settings. Angles are in degrees.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub camera_distance: f32,
    pub camera_yaw: f32,
    pub camera_pitch: f32,
    pub fov: f32,
    /// Keep the camera target on the robot base.
    pub follow: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 720,
            height: 480,
            camera_distance: 1.5,
            camera_yaw: 45.0,
            camera_pitch: 25.0,
            fov: 45.0,
            follow: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Physics substeps per environment step.
    pub frame_skip: usize,
    /// Episodes are truncated once the clock passes this many simulated seconds.
    pub max_episode_seconds: f64,
    pub reset_height: f32,
    /// Base height below which the robot counts as fallen.
    pub fall_height: f32,
    pub control: ControlConfig,
    pub reward: RewardConfig,
    pub render: RenderConfig,
    pub physics: PhysicsConfig,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            frame_skip: 5,
            max_episode_seconds: 5.0,
            reset_height: 0.30,
            fall_height: 0.15,
            control: ControlConfig::default(),
            reward: RewardConfig::default(),
            render: RenderConfig::default(),
            physics: PhysicsConfig::default(),
        }
    }
}

impl EnvConfig {
    /// Loads a JSON config; missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| EnvError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&content).map_err(|source| EnvError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        log::info!("loaded environment config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(EnvError::InvalidConfig(msg.to_string()));

        if self.frame_skip == 0 {
            return fail("frame_skip must be at least 1");
        }
        if !(self.physics.timestep > 0.0) {
            return fail("physics.timestep must be positive");
        }
        if !(self.max_episode_seconds > 0.0) {
            return fail("max_episode_seconds must be positive");
        }
        let [low, high] = self.reward.height_band;
        if !(low < high) {
            return fail("reward.height_band must satisfy low < high");
        }
        let c = &self.control;
        if c.kp < 0.0 || c.kd < 0.0 || c.torque_limit < 0.0 {
            return fail("control gains and torque_limit must be non-negative");
        }
        if self.render.width == 0 || self.render.height == 0 {
            return fail("render size must be non-zero");
        }
        Ok(())
    }
}
