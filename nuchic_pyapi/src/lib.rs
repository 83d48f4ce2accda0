//! Generate `PyO3` interface for `nuchic`

use pyo3::exceptions::{PyIndexError, PyRuntimeError, PyValueError};
use pyo3::prelude::*;

/// Python bindings for the adaptive maps.
pub mod maps;
/// Python bindings for the VEGAS driver.
pub mod vegas;

/// Converts a library error into the matching Python exception.
pub(crate) fn to_py_err(err: nuchic::Error) -> PyErr {
    match err {
        nuchic::Error::InvalidArgument(_) | nuchic::Error::Json(_) => {
            PyValueError::new_err(err.to_string())
        }
        nuchic::Error::OutOfRange { .. } => PyIndexError::new_err(err.to_string()),
        nuchic::Error::CorruptState(_) | nuchic::Error::Io(_) => {
            PyRuntimeError::new_err(err.to_string())
        }
    }
}

/// `PyO3` Python module that contains all exposed classes from Rust.
#[pymodule]
fn nuchic_py(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add("version", env!("CARGO_PKG_VERSION"))?;
    maps::register(m)?;
    vegas::register(m)?;
    Ok(())
}
