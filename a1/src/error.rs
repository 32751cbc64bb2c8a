use std::path::PathBuf;
use thiserror::Error;

use a1_physics::PhysicsError;

#[derive(Error, Debug)]
pub enum EnvError {
    #[error(transparent)]
    Physics(#[from] PhysicsError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("model has {got} {what}, environment declares {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("action has {got} components, expected {expected}")]
    ActionLength { expected: usize, got: usize },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("policy error: {0}")]
    Policy(String),

    #[error("failed to write frame {path}: {source}")]
    Frame {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to write monitor log: {0}")]
    Monitor(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EnvError>;
