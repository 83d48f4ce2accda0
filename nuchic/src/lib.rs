//! `nuchic` provides adaptive importance-sampling maps for Monte Carlo
//! integration and event generation.
//!
//! Two maps warp uniform draws on the unit hypercube into a learned density:
//! [`adaptive_map::AdaptiveMap`], a VEGAS-style grid that redistributes its
//! bin edges after every batch of training data, and
//! [`histogram_map::HistogramMap`], a flat histogram that is nudged one
//! sample at a time and refined by splitting bins. Both implement
//! [`sampler::Samplable`] and can be trained by the [`vegas::Vegas`] driver.

pub mod adaptive_map;
pub mod config;
pub mod error;
pub mod grid;
pub mod histogram_map;
pub mod integrand;
pub mod sampler;
pub mod vegas;

pub mod benchmark {
    //! Reference integrands with known results.
    pub mod integrands;
}

#[cfg(feature = "mpi")]
pub mod mpi;

pub use adaptive_map::AdaptiveMap;
pub use error::{Error, Result};
pub use histogram_map::{HistogramMap, Split};
pub use sampler::Samplable;
