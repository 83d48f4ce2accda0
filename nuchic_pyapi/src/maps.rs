//! Adaptive map interface.

use pyo3::exceptions::{PyIndexError, PyValueError};
use pyo3::prelude::*;

use nuchic::{AdaptiveMap, HistogramMap, Split};

use crate::to_py_err;

#[pyclass(name = "AdaptiveMap")]
#[derive(Clone)]
pub struct PyAdaptiveMap {
    pub(crate) map: AdaptiveMap,
}

impl PyAdaptiveMap {
    fn check_dim(&self, dim: usize) -> PyResult<()> {
        if !self.map.is_initialized() {
            return Err(PyValueError::new_err("the map has no grid yet"));
        }
        if dim >= self.map.dims() {
            return Err(PyIndexError::new_err(format!(
                "dimension {dim} out of range for a {}-dimensional map",
                self.map.dims()
            )));
        }
        Ok(())
    }
}

#[pymethods]
impl PyAdaptiveMap {
    #[new]
    #[pyo3(signature = (dims, bins = 0))]
    fn new(dims: usize, bins: usize) -> PyResult<Self> {
        if dims == 0 {
            return Err(PyValueError::new_err("dims must be positive"));
        }
        Ok(PyAdaptiveMap {
            map: AdaptiveMap::new(dims, bins),
        })
    }

    /// Builds a map from explicit edges, one list per dimension.
    #[staticmethod]
    #[pyo3(signature = (edges, bins = 0))]
    fn from_grid(edges: Vec<Vec<f64>>, bins: usize) -> PyResult<Self> {
        AdaptiveMap::from_grid(edges, bins)
            .map(|map| PyAdaptiveMap { map })
            .map_err(to_py_err)
    }

    #[staticmethod]
    fn from_json(json: &str) -> PyResult<Self> {
        serde_json::from_str(json)
            .map(|map| PyAdaptiveMap { map })
            .map_err(|err| to_py_err(err.into()))
    }

    fn to_json(&self) -> PyResult<String> {
        serde_json::to_string(&self.map).map_err(|err| to_py_err(err.into()))
    }

    #[getter]
    fn dims(&self) -> usize {
        self.map.dims()
    }

    #[getter]
    fn bins(&self) -> usize {
        self.map.bins()
    }

    #[pyo3(signature = (bins = 0))]
    fn make_uniform(&mut self, bins: usize) -> PyResult<()> {
        self.map.make_uniform(bins).map_err(to_py_err)
    }

    fn set_seed(&mut self, seed: u64) {
        self.map.set_seed(seed);
    }

    fn edges(&self, dim: usize) -> PyResult<Vec<f64>> {
        self.check_dim(dim)?;
        Ok(self.map.edges(dim).to_vec())
    }

    fn add_training_point(&mut self, point: Vec<f64>, weight: f64) -> PyResult<()> {
        self.map.add_training_point(&point, weight).map_err(to_py_err)
    }

    fn add_training_data(&mut self, points: Vec<Vec<f64>>, weights: Vec<f64>) -> PyResult<()> {
        self.map
            .add_training_data(&points, &weights)
            .map_err(to_py_err)
    }

    #[pyo3(signature = (dampening = 1.0, bins = 0))]
    fn adapt(&mut self, dampening: f64, bins: usize) -> PyResult<()> {
        self.map.adapt(dampening, bins).map_err(to_py_err)
    }

    fn map_point(&self, y: Vec<f64>) -> PyResult<(Vec<f64>, f64)> {
        self.map.map_point(&y).map_err(to_py_err)
    }

    fn map(&self, ys: Vec<Vec<f64>>) -> PyResult<(Vec<Vec<f64>>, Vec<f64>)> {
        self.map.map(&ys).map_err(to_py_err)
    }

    fn jacobian(&self, y: Vec<f64>) -> PyResult<f64> {
        self.map.jacobian(&y).map_err(to_py_err)
    }

    fn random(&mut self) -> PyResult<(Vec<f64>, f64)> {
        self.map.random().map_err(to_py_err)
    }

    #[pyo3(signature = (ngrid = 5))]
    fn settings(&self, ngrid: usize) -> String {
        self.map.settings(ngrid)
    }

    fn __repr__(&self) -> String {
        format!(
            "AdaptiveMap(dims={}, bins={})",
            self.map.dims(),
            self.map.bins()
        )
    }
}

#[pyclass(name = "HistogramMap")]
#[derive(Clone)]
pub struct PyHistogramMap {
    map: HistogramMap,
}

fn parse_split(split: &str) -> PyResult<Split> {
    match split {
        "half" => Ok(Split::Half),
        "third" => Ok(Split::Third),
        "quarter" => Ok(Split::Quarter),
        other => Err(PyValueError::new_err(format!(
            "unknown split '{other}', expected 'half', 'third' or 'quarter'"
        ))),
    }
}

#[pymethods]
impl PyHistogramMap {
    #[new]
    fn new(dims: usize, bins: usize) -> PyResult<Self> {
        if dims == 0 || bins == 0 {
            return Err(PyValueError::new_err("dims and bins must be positive"));
        }
        Ok(PyHistogramMap {
            map: HistogramMap::new(dims, bins),
        })
    }

    #[getter]
    fn dims(&self) -> usize {
        self.map.dims()
    }

    #[getter]
    fn bins(&self) -> usize {
        self.map.bins()
    }

    fn edges(&self) -> Vec<f64> {
        self.map.edges().to_vec()
    }

    fn dim_edges(&self, dim: usize) -> PyResult<Vec<f64>> {
        if dim >= self.map.dims() {
            return Err(PyIndexError::new_err(format!("dimension {dim} out of range")));
        }
        Ok(self.map.dim_edges(dim).to_vec())
    }

    /// Returns the mapped point and its jacobian.
    fn map(&self, point: Vec<f64>) -> PyResult<(Vec<f64>, f64)> {
        let mut point = point;
        let jacobian = self.map.map_in_place(&mut point).map_err(to_py_err)?;
        Ok((point, jacobian))
    }

    fn adapt(&mut self, rate: f64, point: Vec<f64>) -> PyResult<()> {
        self.map.adapt(rate, &point).map_err(to_py_err)
    }

    #[pyo3(signature = (split = "half"))]
    fn split(&mut self, split: &str) -> PyResult<()> {
        self.map.split(parse_split(split)?).map_err(to_py_err)
    }

    fn serialize(&self) -> PyResult<String> {
        let mut out = Vec::new();
        self.map.serialize(&mut out).map_err(to_py_err)?;
        String::from_utf8(out).map_err(|err| PyValueError::new_err(err.to_string()))
    }

    #[staticmethod]
    fn deserialize(text: &str) -> PyResult<Self> {
        HistogramMap::deserialize(text.as_bytes())
            .map(|map| PyHistogramMap { map })
            .map_err(to_py_err)
    }

    fn __repr__(&self) -> String {
        format!(
            "HistogramMap(dims={}, bins={})",
            self.map.dims(),
            self.map.bins()
        )
    }
}

/// Registers the `maps` submodule with the parent Python module.
///
/// # Errors
///
/// Raises an error if the (sub)module cannot be created or registered.
pub fn register(parent_module: &Bound<'_, PyModule>) -> PyResult<()> {
    let m = PyModule::new_bound(parent_module.py(), "maps")?;
    m.setattr(pyo3::intern!(m.py(), "__doc__"), "Adaptive importance-sampling maps")?;
    pyo3::py_run!(
        parent_module.py(),
        m,
        "import sys; sys.modules['nuchic_py.maps'] = m"
    );
    m.add_class::<PyAdaptiveMap>()?;
    m.add_class::<PyHistogramMap>()?;
    parent_module.add_submodule(&m)
}
