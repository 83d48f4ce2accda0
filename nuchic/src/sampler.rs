//! The `Samplable` trait shared by the adaptive maps.

use crate::error::Result;

/// A map that warps uniform draws and learns from weighted samples.
///
/// The Monte Carlo driver only talks to maps through this trait, so any
/// implementation can be trained by [`crate::vegas::Vegas`].
pub trait Samplable {
    /// Returns the number of dimensions of the map.
    fn dims(&self) -> usize;

    /// Returns the number of bins per dimension.
    fn bins(&self) -> usize;

    /// Maps a uniform draw in `[0, 1)^dims` to a warped point and its jacobian.
    fn map_sample(&self, y: &[f64]) -> Result<(Vec<f64>, f64)>;

    /// Reports a warped point together with its (non-negative) weight.
    fn train(&mut self, point: &[f64], weight: f64) -> Result<()>;

    /// Updates the map from everything reported since the last call.
    ///
    /// `rate` in `[0, 1]` controls how aggressively the map moves.
    fn refine(&mut self, rate: f64) -> Result<()>;

    /// The support of dimension `dim` in the target space.
    fn region(&self, _dim: usize) -> [f64; 2] {
        [0.0, 1.0]
    }
}
