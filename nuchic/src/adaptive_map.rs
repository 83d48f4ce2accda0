//! The multi-dimensional adaptive importance-sampling map.
//!
//! An [`AdaptiveMap`] warps uniform draws in `[0, 1)^d` into points distributed
//! according to a piecewise-uniform density, one [`Grid`] per dimension. The
//! density is learned from training data: callers report weighted sample
//! points with [`AdaptiveMap::add_training_data`] and then call
//! [`AdaptiveMap::adapt`] between batches.

use log::{debug, warn};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use wide::f64x4;

use crate::error::{Error, Result};
use crate::grid::{Grid, Refinement};
use crate::sampler::Samplable;

fn entropy_rng() -> Pcg64 {
    Pcg64::from_entropy()
}

/// A VEGAS-style adaptive map over the unit hypercube.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "MapData")]
pub struct AdaptiveMap {
    /// The number of dimensions.
    dims: usize,
    /// One grid per dimension; empty until the map is initialized.
    grids: Vec<Grid>,
    /// The random source used by [`AdaptiveMap::random`].
    #[serde(skip, default = "entropy_rng")]
    rng: Pcg64,
}

/// The serialized fields of an [`AdaptiveMap`]; every grid is checked on its own
/// before the map checks that they agree.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MapData {
    dims: usize,
    grids: Vec<Grid>,
}

impl TryFrom<MapData> for AdaptiveMap {
    type Error = Error;

    fn try_from(data: MapData) -> Result<Self> {
        if data.dims == 0 {
            return Err(Error::CorruptState(
                "a map needs at least one dimension".to_string(),
            ));
        }
        if !data.grids.is_empty() && data.grids.len() != data.dims {
            return Err(Error::CorruptState(format!(
                "map declares {} dimensions but holds {} grids",
                data.dims,
                data.grids.len()
            )));
        }
        if let Some(grid) = data
            .grids
            .iter()
            .find(|g| g.n_bins() != data.grids[0].n_bins())
        {
            return Err(Error::CorruptState(format!(
                "grids disagree on the bin count: {} and {}",
                data.grids[0].n_bins(),
                grid.n_bins()
            )));
        }
        Ok(AdaptiveMap {
            dims: data.dims,
            grids: data.grids,
            rng: entropy_rng(),
        })
    }
}

impl AdaptiveMap {
    /// Creates a map with `dims` dimensions.
    ///
    /// With `bins > 0` every dimension starts as a uniform grid; with
    /// `bins == 0` the map stays uninitialized until [`AdaptiveMap::make_uniform`]
    /// or [`AdaptiveMap::init_grid`] is called.
    ///
    /// # Panics
    ///
    /// Panics if `dims` is zero.
    pub fn new(dims: usize, bins: usize) -> Self {
        assert!(dims > 0, "Number of dimensions must be positive.");
        let grids = if bins > 0 {
            (0..dims).map(|_| Grid::uniform(bins)).collect()
        } else {
            Vec::new()
        };
        AdaptiveMap {
            dims,
            grids,
            rng: entropy_rng(),
        }
    }

    /// Creates a map seeded with explicit edges, one vector per dimension.
    ///
    /// If `bins > 0` each seeded grid is re-partitioned into `bins` bins of
    /// equal weight under the seeded density.
    pub fn from_grid(edges: Vec<Vec<f64>>, bins: usize) -> Result<Self> {
        if edges.is_empty() {
            return Err(Error::InvalidArgument(
                "a grid needs at least one dimension".to_string(),
            ));
        }
        let mut map = AdaptiveMap {
            dims: edges.len(),
            grids: Vec::new(),
            rng: entropy_rng(),
        };
        map.init_grid(edges, bins)?;
        Ok(map)
    }

    /// Replaces the current grid with explicit edges, one vector per dimension.
    pub fn init_grid(&mut self, edges: Vec<Vec<f64>>, bins: usize) -> Result<()> {
        if edges.len() != self.dims {
            return Err(Error::InvalidArgument(format!(
                "expected edges for {} dimensions, got {}",
                self.dims,
                edges.len()
            )));
        }

        let mut grids = edges
            .into_iter()
            .map(Grid::from_edges)
            .collect::<Result<Vec<_>>>()?;

        if bins > 0 {
            for grid in &mut grids {
                grid.rebin(bins);
            }
        } else if grids.iter().any(|g| g.n_bins() != grids[0].n_bins()) {
            return Err(Error::InvalidArgument(
                "all dimensions must have the same number of bins".to_string(),
            ));
        }

        self.grids = grids;
        Ok(())
    }

    /// Resets every dimension to `bins` equal-width bins.
    ///
    /// `bins == 0` keeps the current bin count, which fails if the map has not
    /// been initialized yet.
    pub fn make_uniform(&mut self, bins: usize) -> Result<()> {
        let bins = match (bins, self.bins()) {
            (0, 0) => {
                return Err(Error::InvalidArgument(
                    "cannot make an uninitialized map uniform without a bin count".to_string(),
                ))
            }
            (0, current) => current,
            (requested, _) => requested,
        };
        self.grids = (0..self.dims).map(|_| Grid::uniform(bins)).collect();
        Ok(())
    }

    /// Sets the seed for the random number generator.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = Pcg64::seed_from_u64(seed);
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// The number of bins per dimension, or 0 for an uninitialized map.
    pub fn bins(&self) -> usize {
        self.grids.first().map_or(0, Grid::n_bins)
    }

    pub fn is_initialized(&self) -> bool {
        !self.grids.is_empty()
    }

    /// The edges of dimension `dim`.
    ///
    /// # Panics
    ///
    /// Panics if the map is uninitialized or `dim >= dims`.
    pub fn edges(&self, dim: usize) -> &[f64] {
        self.grids[dim].edges()
    }

    pub fn grids(&self) -> &[Grid] {
        &self.grids
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::InvalidArgument("the map has no grid yet".to_string()))
        }
    }

    fn check_len(&self, point: &[f64]) -> Result<()> {
        if point.len() == self.dims {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "point has {} coordinates but the map has {} dimensions",
                point.len(),
                self.dims
            )))
        }
    }

    /// Validates a uniform draw: right length, every coordinate in [0, 1).
    fn check_domain(&self, point: &[f64]) -> Result<()> {
        self.check_len(point)?;
        match point.iter().position(|y| !(0.0..1.0).contains(y)) {
            Some(dim) => Err(Error::OutOfRange {
                dim,
                value: point[dim],
            }),
            None => Ok(()),
        }
    }

    /// Validates a training sample: mapped coordinates in [0, 1] and a
    /// finite non-negative weight.
    fn check_training(&self, point: &[f64], weight: f64) -> Result<()> {
        self.check_len(point)?;
        if let Some(dim) = point.iter().position(|x| !(0.0..=1.0).contains(x)) {
            return Err(Error::OutOfRange {
                dim,
                value: point[dim],
            });
        }
        if !(weight >= 0.0 && weight.is_finite()) {
            return Err(Error::InvalidArgument(format!(
                "training weight must be finite and non-negative, got {weight}"
            )));
        }
        Ok(())
    }

    /// Accumulates one training sample.
    pub fn add_training_point(&mut self, point: &[f64], weight: f64) -> Result<()> {
        self.ensure_initialized()?;
        self.check_training(point, weight)?;
        for (grid, &x) in self.grids.iter_mut().zip(point) {
            grid.accumulate(x, weight);
        }
        Ok(())
    }

    /// Accumulates a batch of training samples.
    ///
    /// The batch is validated as a whole before anything is accumulated.
    pub fn add_training_data(&mut self, points: &[Vec<f64>], weights: &[f64]) -> Result<()> {
        self.ensure_initialized()?;
        if points.len() != weights.len() {
            return Err(Error::InvalidArgument(format!(
                "got {} points but {} weights",
                points.len(),
                weights.len()
            )));
        }
        for (point, &weight) in points.iter().zip(weights) {
            self.check_training(point, weight)?;
        }

        for (point, &weight) in points.iter().zip(weights) {
            for (grid, &x) in self.grids.iter_mut().zip(point) {
                grid.accumulate(x, weight);
            }
        }
        Ok(())
    }

    /// Recomputes the bin edges from the accumulated training data and resets it.
    ///
    /// `dampening` in `[0, 1]` controls how far the grid moves: 1 follows the
    /// data fully, 0 leaves the edges where they are. `bins > 0` also changes
    /// the number of bins.
    pub fn adapt(&mut self, dampening: f64, bins: usize) -> Result<()> {
        self.ensure_initialized()?;
        if !(0.0..=1.0).contains(&dampening) {
            return Err(Error::InvalidArgument(format!(
                "dampening must be in [0, 1], got {dampening}"
            )));
        }

        for (dim, grid) in self.grids.iter_mut().enumerate() {
            let samples = grid.n_samples();
            match grid.refine(dampening, bins) {
                Refinement::Uniform => {
                    warn!("dimension {dim}: {samples} samples with zero importance, grid reset to uniform");
                }
                outcome => debug!("dimension {dim}: {samples} samples, {outcome:?}"),
            }
        }
        Ok(())
    }

    /// Maps a single uniform draw, returning the warped point and its jacobian.
    pub fn map_point(&self, point: &[f64]) -> Result<(Vec<f64>, f64)> {
        self.ensure_initialized()?;
        self.check_domain(point)?;

        let mut jacobian = 1.0;
        let mapped = self
            .grids
            .iter()
            .zip(point)
            .map(|(grid, &y)| {
                let (_, x, jac) = grid.map(y);
                jacobian *= jac;
                x
            })
            .collect();
        Ok((mapped, jacobian))
    }

    /// The jacobian of the map at a uniform draw.
    pub fn jacobian(&self, point: &[f64]) -> Result<f64> {
        self.map_point(point).map(|(_, jacobian)| jacobian)
    }

    /// Maps a batch of uniform draws.
    ///
    /// Returns the warped points and one jacobian per point. Every point is
    /// validated before any mapping happens.
    pub fn map(&self, points: &[Vec<f64>]) -> Result<(Vec<Vec<f64>>, Vec<f64>)> {
        self.ensure_initialized()?;
        for point in points {
            self.check_domain(point)?;
        }

        let n = points.len();
        let mut mapped = vec![vec![0.0; self.dims]; n];
        let mut jacobians = vec![1.0; n];

        for (d, grid) in self.grids.iter().enumerate() {
            let packed = n - n % 4;
            for start in (0..packed).step_by(4) {
                let y = f64x4::from([
                    points[start][d],
                    points[start + 1][d],
                    points[start + 2][d],
                    points[start + 3][d],
                ]);
                let (x, jac, _) = grid.map_simd(y);
                for (k, (x, jac)) in x.to_array().into_iter().zip(jac.to_array()).enumerate() {
                    mapped[start + k][d] = x;
                    jacobians[start + k] *= jac;
                }
            }

            for i in packed..n {
                let (_, x, jac) = grid.map(points[i][d]);
                mapped[i][d] = x;
                jacobians[i] *= jac;
            }
        }

        Ok((mapped, jacobians))
    }

    /// Draws a uniform point from the owned random source and maps it.
    pub fn random(&mut self) -> Result<(Vec<f64>, f64)> {
        let y: Vec<f64> = (0..self.dims).map(|_| self.rng.gen::<f64>()).collect();
        self.map_point(&y)
    }

    /// The support of dimension `dim`; always the unit interval.
    pub fn region(&self, _dim: usize) -> [f64; 2] {
        [0.0, 1.0]
    }

    pub fn all_region(&self) -> Vec<[f64; 2]> {
        (0..self.dims).map(|d| self.region(d)).collect()
    }

    /// A human-readable summary showing about `ngrid` edges per dimension.
    /// `ngrid == 0` prints every edge.
    pub fn settings(&self, ngrid: usize) -> String {
        let mut out = format!(
            "Adaptive map: {} dimensions, {} bins\n",
            self.dims,
            self.bins()
        );
        if !self.is_initialized() {
            out.push_str("    grid not initialized\n");
            return out;
        }

        let bins = self.bins();
        let stride = if ngrid == 0 || ngrid >= bins {
            1
        } else {
            bins.div_ceil(ngrid)
        };
        for (d, grid) in self.grids.iter().enumerate() {
            let shown: Vec<String> = grid
                .edges()
                .iter()
                .enumerate()
                .filter(|(i, _)| i % stride == 0 || *i == bins)
                .map(|(_, edge)| format!("{edge:.6}"))
                .collect();
            out.push_str(&format!("    grid[{d:2}] = [{}]\n", shown.join(", ")));
        }
        out
    }

    /// Reduces training data across parallel workers.
    ///
    /// A single process has nothing to reduce, so this does nothing and may be
    /// called any number of times. Distributed runs use
    /// `all_reduce_training_data` from the `mpi` feature instead.
    pub fn mpi_sync(&mut self) {}

    /// The accumulated training data as a flat buffer: all `sum_f` values
    /// dimension by dimension, followed by all `n_f` values.
    pub fn training_data(&self) -> Vec<f64> {
        let sums = self.grids.iter().flat_map(|g| g.sum_f.iter().copied());
        let counts = self.grids.iter().flat_map(|g| g.n_f.iter().copied());
        sums.chain(counts).collect()
    }

    /// Replaces the accumulated training data with a buffer in the layout of
    /// [`AdaptiveMap::training_data`].
    pub fn set_training_data(&mut self, data: &[f64]) -> Result<()> {
        self.ensure_initialized()?;
        let bins = self.bins();
        let half = self.dims * bins;
        if data.len() != 2 * half {
            return Err(Error::InvalidArgument(format!(
                "training buffer has {} values, expected {}",
                data.len(),
                2 * half
            )));
        }
        if data.iter().any(|v| !(*v >= 0.0)) {
            return Err(Error::InvalidArgument(
                "training buffer contains negative or NaN values".to_string(),
            ));
        }

        let (sums, counts) = data.split_at(half);
        for (d, grid) in self.grids.iter_mut().enumerate() {
            grid.sum_f.copy_from_slice(&sums[d * bins..(d + 1) * bins]);
            grid.n_f.copy_from_slice(&counts[d * bins..(d + 1) * bins]);
        }
        Ok(())
    }
}

impl Samplable for AdaptiveMap {
    fn dims(&self) -> usize {
        self.dims
    }

    fn bins(&self) -> usize {
        AdaptiveMap::bins(self)
    }

    fn map_sample(&self, y: &[f64]) -> Result<(Vec<f64>, f64)> {
        self.map_point(y)
    }

    fn train(&mut self, point: &[f64], weight: f64) -> Result<()> {
        self.add_training_point(point, weight)
    }

    fn refine(&mut self, rate: f64) -> Result<()> {
        self.adapt(rate, 0)
    }
}
