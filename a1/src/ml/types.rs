// Observation, action and space types shared by the environment and policies

use rand::Rng;

use crate::error::{EnvError, Result};

/// Flat observation vector: generalized positions followed by generalized
/// velocities.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    pub values: Vec<f32>,
}

impl Observation {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Base height (third position component).
    pub fn base_height(&self) -> f32 {
        self.values[2]
    }
}

/// Normalized action, one component per actuated joint.
///
/// Components are nominally in `[-1, 1]`; larger values are accepted and
/// scaled linearly by the controller.
#[derive(Clone, Debug, PartialEq)]
pub struct Action {
    pub values: [f32; 12],
}

impl Action {
    /// Size of action vector
    pub const SIZE: usize = 12;

    /// Create from flat vector (e.g. neural network output)
    pub fn from_slice(values: &[f32]) -> Result<Self> {
        let values: [f32; Self::SIZE] =
            values.try_into().map_err(|_| EnvError::ActionLength {
                expected: Self::SIZE,
                got: values.len(),
            })?;
        Ok(Self { values })
    }

    /// Narrowing constructor for double-precision callers.
    pub fn from_f64_slice(values: &[f64]) -> Result<Self> {
        let narrowed: Vec<f32> = values.iter().map(|&v| v as f32).collect();
        Self::from_slice(&narrowed)
    }

    pub fn to_vec(&self) -> Vec<f32> {
        self.values.to_vec()
    }

    /// Hold the reference pose.
    pub fn zero() -> Self {
        Self {
            values: [0.0; Self::SIZE],
        }
    }
}

/// A box in `R^n` with the same bounds on every axis.
#[derive(Clone, Debug, PartialEq)]
pub struct BoxSpace {
    pub low: f32,
    pub high: f32,
    dim: usize,
}

impl BoxSpace {
    pub fn new(low: f32, high: f32, dim: usize) -> Self {
        Self { low, high, dim }
    }

    pub fn unbounded(dim: usize) -> Self {
        Self::new(f32::NEG_INFINITY, f32::INFINITY, dim)
    }

    pub fn shape(&self) -> [usize; 1] {
        [self.dim]
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn is_bounded(&self) -> bool {
        self.low.is_finite() && self.high.is_finite()
    }

    pub fn contains(&self, values: &[f32]) -> bool {
        values.len() == self.dim && values.iter().all(|&v| v >= self.low && v <= self.high)
    }

    /// Uniform sample; `None` when the box is unbounded.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Vec<f32>> {
        if !self.is_bounded() {
            return None;
        }
        Some(
            (0..self.dim)
                .map(|_| rng.random_range(self.low..=self.high))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn action_rejects_wrong_length() {
        let err = Action::from_slice(&[0.0; 11]).unwrap_err();
        assert!(matches!(
            err,
            EnvError::ActionLength {
                expected: 12,
                got: 11
            }
        ));
        assert!(Action::from_slice(&[0.5; 12]).is_ok());
    }

    #[test]
    fn action_accepts_out_of_range_values() {
        let action = Action::from_slice(&[3.0; 12]).unwrap();
        assert_eq!(action.values[0], 3.0);
    }

    #[test]
    fn bounded_samples_stay_inside() {
        let space = BoxSpace::new(-1.0, 1.0, Action::SIZE);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let sample = space.sample(&mut rng).unwrap();
            assert!(space.contains(&sample));
        }
        assert_eq!(space.shape(), [12]);
    }

    #[test]
    fn unbounded_space_contains_any_finite_vector() {
        let space = BoxSpace::unbounded(37);
        let values: Vec<f32> = (0..37).map(|i| i as f32 * 1.0e3 - 2.0e4).collect();
        assert!(space.contains(&values));
        assert!(!space.contains(&values[..36]));
    }

    #[test]
    fn unbounded_space_cannot_be_sampled() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(BoxSpace::unbounded(37).sample(&mut rng).is_none());
    }

    #[test]
    fn double_precision_actions_are_narrowed() {
        let action = Action::from_f64_slice(&[0.25_f64; 12]).unwrap();
        assert_eq!(action.values, [0.25_f32; 12]);
        assert!(matches!(
            Action::from_f64_slice(&[0.0; 13]),
            Err(EnvError::ActionLength {
                expected: 12,
                got: 13
            })
        ));
    }
}
