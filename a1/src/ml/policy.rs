use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use tract_onnx::prelude::*;

use crate::error::{EnvError, Result};

type OnnxPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

enum Backend {
    Onnx(OnnxPlan),
    /// Outputs zeros, i.e. holds the reference pose.
    Standing,
    /// Uniform actions in `[-1, 1]`.
    Random(StdRng),
}

/// Maps an observation to an action.
/// Can be backed by an exported ONNX network or hand-coded logic.
pub struct Policy {
    backend: Backend,
    input_size: usize,
    output_size: usize,
}

fn policy_error(e: impl std::fmt::Display) -> EnvError {
    EnvError::Policy(e.to_string())
}

impl Policy {
    /// Create a new policy from an ONNX model.
    ///
    /// The network must take a `[1, input_size]` float tensor and return
    /// `output_size` floats, e.g. a Stable-Baselines3 actor exported with
    /// `torch.onnx.export(actor, torch.zeros(1, obs_dim), "policy.onnx")`.
    pub fn from_onnx(onnx_bytes: &[u8], input_size: usize, output_size: usize) -> Result<Self> {
        log::info!("Loading ONNX model ({} bytes)", onnx_bytes.len());

        let model = tract_onnx::onnx()
            .model_for_read(&mut &onnx_bytes[..])
            .map_err(policy_error)?
            .with_input_fact(0, f32::fact([1, input_size]).into())
            .map_err(policy_error)?
            .into_optimized()
            .map_err(policy_error)?
            .into_runnable()
            .map_err(policy_error)?;

        log::info!(
            "ONNX model loaded: input_size={}, output_size={}",
            input_size,
            output_size
        );

        Ok(Self {
            backend: Backend::Onnx(model),
            input_size,
            output_size,
        })
    }

    pub fn from_onnx_file(
        path: impl AsRef<Path>,
        input_size: usize,
        output_size: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| EnvError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_onnx(&bytes, input_size, output_size)
    }

    /// Create a standing/idle policy (outputs zero actions)
    pub fn standing(obs_size: usize, action_size: usize) -> Self {
        Self {
            backend: Backend::Standing,
            input_size: obs_size,
            output_size: action_size,
        }
    }

    pub fn random(obs_size: usize, action_size: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            backend: Backend::Random(rng),
            input_size: obs_size,
            output_size: action_size,
        }
    }

    /// Run inference: observation -> action
    pub fn forward(&mut self, observation: &[f32]) -> Result<Vec<f32>> {
        if observation.len() != self.input_size {
            return Err(EnvError::Policy(format!(
                "observation has {} values, policy expects {}",
                observation.len(),
                self.input_size
            )));
        }

        match &mut self.backend {
            Backend::Onnx(model) => {
                let input =
                    tract_ndarray::Array2::from_shape_vec((1, self.input_size), observation.to_vec())
                        .map_err(policy_error)?;
                let result = model
                    .run(tvec![Tensor::from(input).into()])
                    .map_err(policy_error)?;

                let output = result[0]
                    .to_array_view::<f32>()
                    .map_err(policy_error)?
                    .iter()
                    .cloned()
                    .collect::<Vec<_>>();

                if output.len() != self.output_size {
                    return Err(EnvError::Policy(format!(
                        "network produced {} values, expected {}",
                        output.len(),
                        self.output_size
                    )));
                }
                Ok(output)
            }
            Backend::Standing => Ok(vec![0.0; self.output_size]),
            Backend::Random(rng) => Ok((0..self.output_size)
                .map(|_| rng.random_range(-1.0..=1.0))
                .collect()),
        }
    }

    /// Get input observation size
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    /// Get output action size
    pub fn output_size(&self) -> usize {
        self.output_size
    }
}
