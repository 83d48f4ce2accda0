//! VEGAS interface.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyList;

use nuchic::config::VegasConfig;
use nuchic::integrand::Integrand;
use nuchic::vegas::{Vegas, VegasResult};

use crate::maps::PyAdaptiveMap;
use crate::to_py_err;

// A wrapper for Python callables to implement the Integrand trait
#[pyclass(name = "Integrand")]
struct PyIntegrand {
    callable: PyObject,
    dim: usize,
}

impl Integrand for PyIntegrand {
    fn dim(&self) -> usize {
        self.dim
    }

    fn eval(&self, x: &[f64]) -> f64 {
        Python::with_gil(|py| {
            let args = (PyList::new_bound(py, x),);
            self.callable
                .call1(py, args)
                .and_then(|result| result.extract::<f64>(py))
                .unwrap_or_else(|err| {
                    eprintln!("Error evaluating integrand: {err}");
                    0.0
                })
        })
    }
}

// Rayon calls the integrand from worker threads; every call takes the GIL.
unsafe impl Send for PyIntegrand {}
unsafe impl Sync for PyIntegrand {}

#[pymethods]
impl PyIntegrand {
    #[new]
    fn new(callable: PyObject, dim: usize) -> Self {
        PyIntegrand { callable, dim }
    }
}

#[pyclass(name = "VegasResult")]
#[derive(Debug, Clone, Copy)]
struct PyVegasResult {
    #[pyo3(get)]
    value: f64,
    #[pyo3(get)]
    error: f64,
    #[pyo3(get)]
    chi2_dof: f64,
}

impl From<VegasResult> for PyVegasResult {
    fn from(result: VegasResult) -> Self {
        PyVegasResult {
            value: result.value,
            error: result.error,
            chi2_dof: result.chi2_dof,
        }
    }
}

#[pymethods]
impl PyVegasResult {
    fn __repr__(&self) -> String {
        format!(
            "VegasResult(value={:.6e}, error={:.6e}, chi2_dof={:.4})",
            self.value, self.error, self.chi2_dof
        )
    }

    fn __str__(&self) -> String {
        format!(
            "Value: {:.6e} ± {:.6e}, χ²/dof: {:.4}",
            self.value, self.error, self.chi2_dof
        )
    }
}

#[pyclass(name = "Vegas")]
struct PyVegas {
    vegas: Vegas,
    dim: usize,
}

impl PyVegas {
    fn from_config(config: VegasConfig, boundaries: Vec<(f64, f64)>) -> PyResult<Self> {
        let dim = boundaries.len();
        let vegas = Vegas::new(config, &boundaries).map_err(to_py_err)?;
        Ok(PyVegas { vegas, dim })
    }

    fn wrap(&self, py: Python, callable: PyObject) -> PyResult<PyIntegrand> {
        if !callable.bind(py).is_callable() {
            return Err(PyValueError::new_err("integrand must be callable"));
        }
        Ok(PyIntegrand {
            callable,
            dim: self.dim,
        })
    }
}

#[pymethods]
impl PyVegas {
    #[new]
    #[pyo3(signature = (n_iter, n_eval, n_bins, alpha, boundaries, seed = None, target_accuracy = None))]
    fn new(
        n_iter: usize,
        n_eval: usize,
        n_bins: usize,
        alpha: f64,
        boundaries: Vec<(f64, f64)>,
        seed: Option<u64>,
        target_accuracy: Option<f64>,
    ) -> PyResult<Self> {
        let config = VegasConfig {
            n_iter,
            n_eval,
            n_bins,
            alpha,
            seed,
            target_accuracy,
        };
        Self::from_config(config, boundaries)
    }

    /// Builds an integrator from a JSON configuration document.
    #[staticmethod]
    fn from_json(json: &str, boundaries: Vec<(f64, f64)>) -> PyResult<Self> {
        let config = VegasConfig::from_json(json).map_err(to_py_err)?;
        Self::from_config(config, boundaries)
    }

    fn set_seed(&mut self, seed: u64) {
        self.vegas.set_seed(seed);
    }

    /// A copy of the current adaptive map.
    fn map(&self) -> PyAdaptiveMap {
        PyAdaptiveMap {
            map: self.vegas.map().clone(),
        }
    }

    fn integrate_integrand(
        &mut self,
        py: Python,
        integrand: &PyIntegrand,
    ) -> PyResult<PyVegasResult> {
        py.allow_threads(|| self.vegas.integrate(integrand))
            .map(PyVegasResult::from)
            .map_err(to_py_err)
    }

    fn integrate(&mut self, py: Python, callable: PyObject) -> PyResult<PyVegasResult> {
        let integrand = self.wrap(py, callable)?;
        py.allow_threads(|| self.vegas.integrate(&integrand))
            .map(PyVegasResult::from)
            .map_err(to_py_err)
    }

    #[cfg(feature = "mpi")]
    #[pyo3(signature = (callable, target_accuracy = None))]
    fn integrate_mpi(
        &mut self,
        py: Python,
        callable: PyObject,
        target_accuracy: Option<f64>,
    ) -> PyResult<PyVegasResult> {
        use mpi::traits::*;
        use pyo3::exceptions::PyRuntimeError;

        let integrand = self.wrap(py, callable)?;
        // MPI can only be initialized once per process.
        py.allow_threads(|| {
            let universe = mpi::initialize()?;
            let world = universe.world();
            Some(self.vegas.integrate_mpi(&integrand, &world, target_accuracy))
        })
        .ok_or_else(|| PyRuntimeError::new_err("MPI is already initialized"))?
        .map(PyVegasResult::from)
        .map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        format!("Vegas(dim={})", self.dim)
    }
}

/// Registers the `vegas` submodule with the parent Python module.
///
/// # Errors
///
/// Raises an error if the (sub)module cannot be created or registered.
pub fn register(parent_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let m = PyModule::new_bound(parent_module.py(), "vegas")?;
    m.setattr(pyo3::intern!(m.py(), "__doc__"), "Interface to Vegas")?;
    pyo3::py_run!(
        parent_module.py(),
        m,
        "import sys; sys.modules['nuchic_py.vegas'] = m"
    );
    m.add_class::<PyIntegrand>()?;
    m.add_class::<PyVegasResult>()?;
    m.add_class::<PyVegas>()?;
    parent_module.add_submodule(&m)
}
