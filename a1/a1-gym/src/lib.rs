//! Python bindings for the A1 environment.
//!
//! ```python
//! from a1_gym import UnitreeA1Env
//!
//! env = UnitreeA1Env(render_mode="rgb_array")
//! obs, info = env.reset(seed=0)
//! obs, reward, terminated, truncated, info = env.step(np.zeros(12))
//! frame = env.render()  # (480, 720, 3) uint8
//! env.close()
//! ```

use numpy::{PyArray1, PyArray3, PyArrayMethods, PyReadonlyArray1};
use pyo3::exceptions::{PyIOError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use a1_env::{A1Env, Action, Env, EnvConfig, EnvError, PngSequenceSink, RenderMode};

fn to_py_err(err: EnvError) -> PyErr {
    match err {
        EnvError::ActionLength { .. } | EnvError::InvalidConfig(_) => {
            PyValueError::new_err(err.to_string())
        }
        EnvError::Io { .. } => PyIOError::new_err(err.to_string()),
        other => PyRuntimeError::new_err(other.to_string()),
    }
}

/// Actions arrive as float32 or float64 arrays, or as plain sequences.
#[derive(FromPyObject)]
enum ActionInput<'py> {
    F32(PyReadonlyArray1<'py, f32>),
    F64(PyReadonlyArray1<'py, f64>),
    Sequence(Vec<f64>),
}

impl ActionInput<'_> {
    fn to_action(&self) -> PyResult<Action> {
        let not_contiguous = |_| PyValueError::new_err("action array must be contiguous");
        let action = match self {
            Self::F32(array) => Action::from_slice(array.as_slice().map_err(not_contiguous)?),
            Self::F64(array) => Action::from_f64_slice(array.as_slice().map_err(not_contiguous)?),
            Self::Sequence(values) => Action::from_f64_slice(values),
        };
        action.map_err(to_py_err)
    }
}

/// Unitree A1 locomotion environment with a Gymnasium-style API.
#[pyclass]
pub struct UnitreeA1Env {
    inner: A1Env,
}

#[pymethods]
impl UnitreeA1Env {
    /// * `render_mode` - `None`, `"rgb_array"` or `"human"`
    /// * `scene_path` - URDF scene; defaults to the bundled model
    /// * `config_path` - JSON environment config
    /// * `frames_dir` - where `"human"` mode writes PNG frames
    #[new]
    #[pyo3(signature = (render_mode=None, scene_path=None, config_path=None, frames_dir=None))]
    pub fn new(
        render_mode: Option<&str>,
        scene_path: Option<String>,
        config_path: Option<String>,
        frames_dir: Option<String>,
    ) -> PyResult<Self> {
        let render_mode = render_mode
            .map(str::parse::<RenderMode>)
            .transpose()
            .map_err(to_py_err)?;
        let config = match config_path {
            Some(path) => EnvConfig::from_file(path).map_err(to_py_err)?,
            None => EnvConfig::default(),
        };
        let scene = scene_path
            .map(Into::into)
            .unwrap_or_else(A1Env::default_scene_path);

        let mut inner = A1Env::from_urdf(scene, config, render_mode).map_err(to_py_err)?;
        if let Some(dir) = frames_dir {
            inner.set_display_sink(Box::new(PngSequenceSink::new(dir).map_err(to_py_err)?));
        }
        Ok(Self { inner })
    }

    #[getter]
    pub fn observation_dim(&self) -> usize {
        self.inner.observation_space().dim()
    }

    #[getter]
    pub fn action_dim(&self) -> usize {
        self.inner.action_space().dim()
    }

    /// `(obs, info)`
    #[pyo3(signature = (seed=None, options=None))]
    pub fn reset<'py>(
        &mut self,
        py: Python<'py>,
        seed: Option<u64>,
        options: Option<&Bound<'py, PyDict>>,
    ) -> PyResult<(Bound<'py, PyArray1<f32>>, Bound<'py, PyDict>)> {
        // Options carry nothing the environment uses
        let _ = options;
        let (obs, _) = self.inner.reset(seed, None).map_err(to_py_err)?;
        Ok((
            PyArray1::from_vec_bound(py, obs.values),
            PyDict::new_bound(py),
        ))
    }

    /// `(obs, reward, terminated, truncated, info)`
    #[allow(clippy::type_complexity)]
    pub fn step<'py>(
        &mut self,
        py: Python<'py>,
        action: ActionInput<'py>,
    ) -> PyResult<(Bound<'py, PyArray1<f32>>, f32, bool, bool, Bound<'py, PyDict>)> {
        let action = action.to_action()?;

        let result = self.inner.step(&action).map_err(to_py_err)?;
        Ok((
            PyArray1::from_vec_bound(py, result.observation.values),
            result.reward,
            result.terminated,
            result.truncated,
            PyDict::new_bound(py),
        ))
    }

    /// `(height, width, 3)` uint8 array in `"rgb_array"` mode, otherwise `None`.
    pub fn render<'py>(&mut self, py: Python<'py>) -> PyResult<Option<Bound<'py, PyArray3<u8>>>> {
        let Some(frame) = self.inner.render().map_err(to_py_err)? else {
            return Ok(None);
        };
        let (width, height) = frame.dimensions();
        let pixels = PyArray1::from_vec_bound(py, frame.into_raw());
        Ok(Some(pixels.reshape([height as usize, width as usize, 3])?))
    }

    pub fn close(&mut self) {
        self.inner.close();
    }
}

#[pymodule]
fn a1_gym(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<UnitreeA1Env>()?;
    Ok(())
}
