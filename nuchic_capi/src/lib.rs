//! The C-language interface for `nuchic`

use std::ffi::c_void;
use std::os::raw::c_int;
use std::slice;

use nuchic::config::VegasConfig;
use nuchic::vegas::{Vegas, VegasResult};
use nuchic::{AdaptiveMap, Error};

/// Status codes returned by the fallible functions of this interface.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NuchicStatus {
    Ok = 0,
    InvalidArgument = 1,
    OutOfRange = 2,
    CorruptState = 3,
    Io = 4,
    NullPointer = 5,
}

impl From<&Error> for NuchicStatus {
    fn from(err: &Error) -> Self {
        match err {
            Error::InvalidArgument(_) | Error::Json(_) => NuchicStatus::InvalidArgument,
            Error::OutOfRange { .. } => NuchicStatus::OutOfRange,
            Error::CorruptState(_) => NuchicStatus::CorruptState,
            Error::Io(_) => NuchicStatus::Io,
        }
    }
}

fn status<T>(result: nuchic::Result<T>) -> NuchicStatus {
    match result {
        Ok(_) => NuchicStatus::Ok,
        Err(err) => NuchicStatus::from(&err),
    }
}

/// A C-compatible struct for integration boundaries.
#[repr(C)]
pub struct CBoundary {
    pub min: f64,
    pub max: f64,
}

/// The C-style integrand function pointer.
/// The first argument is the point `x` (an array of f64).
/// The second argument is the dimension.
/// The third is a user-provided `user_data` pointer.
pub type CIntegrand = extern "C" fn(*const f64, c_int, *mut c_void) -> f64;

/// A wrapper that implements the Rust `Integrand` trait.
struct CIntegrandWrapper {
    dim: usize,
    func: CIntegrand,
    user_data: *mut c_void,
}

impl nuchic::integrand::Integrand for CIntegrandWrapper {
    fn dim(&self) -> usize {
        self.dim
    }

    fn eval(&self, x: &[f64]) -> f64 {
        (self.func)(x.as_ptr(), self.dim as c_int, self.user_data)
    }
}

/// This is unsafe, but required to integrate with Rayon.
/// The user of the C API is responsible for ensuring that the provided
/// integrand function is thread-safe.
unsafe impl Sync for CIntegrandWrapper {}

/// The opaque pointer to an adaptive map.
pub type AdaptiveMapC = c_void;

/// The opaque pointer to the Vegas integrator.
pub type VegasC = c_void;

/// Creates a new adaptive map with `dims` dimensions and `bins` uniform bins.
///
/// `bins == 0` leaves the map uninitialized until `nuchic_map_make_uniform`
/// is called. Returns a null pointer if `dims` is zero.
#[no_mangle]
pub extern "C" fn nuchic_map_new(dims: usize, bins: usize) -> *mut AdaptiveMapC {
    if dims == 0 {
        return std::ptr::null_mut();
    }
    Box::into_raw(Box::new(AdaptiveMap::new(dims, bins))) as *mut AdaptiveMapC
}

/// Resets the map to `bins` uniform bins (0 keeps the current count).
///
/// # Safety
///
/// `map_ptr` must be a valid pointer returned by `nuchic_map_new`.
#[no_mangle]
pub unsafe extern "C" fn nuchic_map_make_uniform(
    map_ptr: *mut AdaptiveMapC,
    bins: usize,
) -> NuchicStatus {
    let Some(map) = (map_ptr as *mut AdaptiveMap).as_mut() else {
        return NuchicStatus::NullPointer;
    };
    status(map.make_uniform(bins))
}

/// Returns the number of dimensions of the map, or 0 for a null pointer.
///
/// # Safety
///
/// `map_ptr` must be null or a valid pointer returned by `nuchic_map_new`.
#[no_mangle]
pub unsafe extern "C" fn nuchic_map_dims(map_ptr: *const AdaptiveMapC) -> usize {
    (map_ptr as *const AdaptiveMap)
        .as_ref()
        .map_or(0, AdaptiveMap::dims)
}

/// Returns the number of bins of the map, or 0 if it has no grid.
///
/// # Safety
///
/// `map_ptr` must be null or a valid pointer returned by `nuchic_map_new`.
#[no_mangle]
pub unsafe extern "C" fn nuchic_map_bins(map_ptr: *const AdaptiveMapC) -> usize {
    (map_ptr as *const AdaptiveMap)
        .as_ref()
        .map_or(0, AdaptiveMap::bins)
}

/// Adds one training sample.
///
/// # Safety
///
/// `map_ptr` must be a valid pointer returned by `nuchic_map_new` and
/// `point` must point to `nuchic_map_dims(map_ptr)` doubles.
#[no_mangle]
pub unsafe extern "C" fn nuchic_map_add_training_point(
    map_ptr: *mut AdaptiveMapC,
    point: *const f64,
    weight: f64,
) -> NuchicStatus {
    let Some(map) = (map_ptr as *mut AdaptiveMap).as_mut() else {
        return NuchicStatus::NullPointer;
    };
    if point.is_null() {
        return NuchicStatus::NullPointer;
    }
    let point = slice::from_raw_parts(point, map.dims());
    status(map.add_training_point(point, weight))
}

/// Adapts the map to the accumulated training data.
///
/// # Safety
///
/// `map_ptr` must be a valid pointer returned by `nuchic_map_new`.
#[no_mangle]
pub unsafe extern "C" fn nuchic_map_adapt(
    map_ptr: *mut AdaptiveMapC,
    dampening: f64,
    bins: usize,
) -> NuchicStatus {
    let Some(map) = (map_ptr as *mut AdaptiveMap).as_mut() else {
        return NuchicStatus::NullPointer;
    };
    status(map.adapt(dampening, bins))
}

/// Maps a uniform draw `y` into `x_out` and stores the jacobian in `jacobian_out`.
///
/// # Safety
///
/// `map_ptr` must be a valid pointer returned by `nuchic_map_new`; `y` and
/// `x_out` must each point to `nuchic_map_dims(map_ptr)` doubles and
/// `jacobian_out` to one double.
#[no_mangle]
pub unsafe extern "C" fn nuchic_map_map_point(
    map_ptr: *const AdaptiveMapC,
    y: *const f64,
    x_out: *mut f64,
    jacobian_out: *mut f64,
) -> NuchicStatus {
    let Some(map) = (map_ptr as *const AdaptiveMap).as_ref() else {
        return NuchicStatus::NullPointer;
    };
    if y.is_null() || x_out.is_null() || jacobian_out.is_null() {
        return NuchicStatus::NullPointer;
    }

    let y = slice::from_raw_parts(y, map.dims());
    match map.map_point(y) {
        Ok((x, jacobian)) => {
            slice::from_raw_parts_mut(x_out, x.len()).copy_from_slice(&x);
            *jacobian_out = jacobian;
            NuchicStatus::Ok
        }
        Err(err) => NuchicStatus::from(&err),
    }
}

/// Frees the memory of the adaptive map.
///
/// # Safety
///
/// `map_ptr` must be a valid pointer returned by `nuchic_map_new`
/// and must not be used afterward.
#[no_mangle]
pub unsafe extern "C" fn nuchic_map_free(map_ptr: *mut AdaptiveMapC) {
    if !map_ptr.is_null() {
        drop(Box::from_raw(map_ptr as *mut AdaptiveMap));
    }
}

/// Creates a new VEGAS integrator.
///
/// Returns a null pointer if the settings are invalid.
///
/// # Safety
///
/// `boundaries` must be a valid pointer to an array of `CBoundary`
/// of size `dim`.
#[no_mangle]
pub unsafe extern "C" fn nuchic_vegas_new(
    n_iter: usize,
    n_eval: usize,
    n_bins: usize,
    alpha: f64,
    dim: usize,
    boundaries: *const CBoundary,
) -> *mut VegasC {
    if boundaries.is_null() {
        return std::ptr::null_mut();
    }
    let boundaries_slice = slice::from_raw_parts(boundaries, dim);
    let rust_boundaries: Vec<(f64, f64)> =
        boundaries_slice.iter().map(|b| (b.min, b.max)).collect();

    let config = VegasConfig {
        n_iter,
        n_eval,
        n_bins,
        alpha,
        ..VegasConfig::default()
    };
    match Vegas::new(config, &rust_boundaries) {
        Ok(vegas) => Box::into_raw(Box::new(vegas)) as *mut VegasC,
        Err(_) => std::ptr::null_mut(),
    }
}

/// Sets the seed of the integrator's random number generator.
///
/// # Safety
///
/// `vegas_ptr` must be a valid pointer returned by `nuchic_vegas_new`.
#[no_mangle]
pub unsafe extern "C" fn nuchic_vegas_set_seed(vegas_ptr: *mut VegasC, seed: u64) {
    if let Some(vegas) = (vegas_ptr as *mut Vegas).as_mut() {
        vegas.set_seed(seed);
    }
}

/// Integrates the given function using the VEGAS algorithm.
///
/// # Safety
/// `vegas_ptr` must be a valid pointer returned by `nuchic_vegas_new`.
/// `integrand_func` must be a valid function pointer and `result_out` must
/// point to a writable `VegasResult`.
#[no_mangle]
pub unsafe extern "C" fn nuchic_vegas_integrate(
    vegas_ptr: *mut VegasC,
    integrand_func: CIntegrand,
    user_data: *mut c_void,
    result_out: *mut VegasResult,
) -> NuchicStatus {
    let Some(vegas) = (vegas_ptr as *mut Vegas).as_mut() else {
        return NuchicStatus::NullPointer;
    };
    if result_out.is_null() {
        return NuchicStatus::NullPointer;
    }

    let integrand = CIntegrandWrapper {
        dim: vegas.dim(),
        func: integrand_func,
        user_data,
    };

    match vegas.integrate(&integrand) {
        Ok(result) => {
            *result_out = result;
            NuchicStatus::Ok
        }
        Err(err) => NuchicStatus::from(&err),
    }
}

/// Frees the memory of the VEGAS integrator.
///
/// # Safety
///
/// `vegas_ptr` must be a valid pointer returned by `nuchic_vegas_new`
/// and must not be used afterward.
#[no_mangle]
pub unsafe extern "C" fn nuchic_vegas_free(vegas_ptr: *mut VegasC) {
    if !vegas_ptr.is_null() {
        drop(Box::from_raw(vegas_ptr as *mut Vegas));
    }
}
