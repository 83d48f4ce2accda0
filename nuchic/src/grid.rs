//! The per-dimension partition of the unit interval used by the adaptive map.

use log::trace;
use serde::{Deserialize, Serialize};
use wide::f64x4;

use crate::error::{Error, Result};

/// Outcome of a [`Grid::refine`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refinement {
    /// No samples were accumulated; the edges were kept (re-binned if requested).
    Unchanged,
    /// Samples were present but carried no importance; edges were reset to uniform.
    Uniform,
    /// Edges were redistributed to equalize the accumulated importance.
    Adapted,
}

/// Represents the adaptive grid for a single dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GridData")]
pub struct Grid {
    /// The number of bins in the grid.
    n_bins: usize,
    /// The bin edges, of size `n_bins + 1`, running from 0 to 1.
    edges: Vec<f64>,
    /// Sum of the training weights that landed in each bin.
    pub(crate) sum_f: Vec<f64>,
    /// Number of training samples that landed in each bin. Stored as `f64` so
    /// it can be reduced together with `sum_f`.
    pub(crate) n_f: Vec<f64>,
}

impl Grid {
    /// Creates a new uniform grid for a given number of bins.
    ///
    /// # Panics
    ///
    /// Panics if `n_bins` is zero.
    pub fn uniform(n_bins: usize) -> Self {
        assert!(n_bins > 0, "A grid needs at least one bin.");
        let edges = (0..=n_bins).map(|i| i as f64 / n_bins as f64).collect();
        Self::with_edges(edges)
    }

    /// Creates a grid from explicit edges.
    ///
    /// The edges must be finite, strictly increasing, start at 0 and end at 1.
    pub fn from_edges(edges: Vec<f64>) -> Result<Self> {
        validate_edges(&edges).map_err(Error::InvalidArgument)?;
        Ok(Self::with_edges(edges))
    }

    fn with_edges(edges: Vec<f64>) -> Self {
        let n_bins = edges.len() - 1;
        Grid {
            n_bins,
            edges,
            sum_f: vec![0.0; n_bins],
            n_f: vec![0.0; n_bins],
        }
    }

    pub fn n_bins(&self) -> usize {
        self.n_bins
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Resets the accumulated training data to zero.
    pub fn reset_importance_data(&mut self) {
        self.sum_f.fill(0.0);
        self.n_f.fill(0.0);
    }

    /// Total number of samples accumulated since the last refinement.
    pub fn n_samples(&self) -> f64 {
        self.n_f.iter().sum()
    }

    /// Finds the bin containing `x` by binary search over the edges.
    ///
    /// `x == 1` resolves to the last bin.
    pub fn locate(&self, x: f64) -> usize {
        let upper = self.edges.partition_point(|&edge| edge <= x);
        upper.saturating_sub(1).min(self.n_bins - 1)
    }

    /// Adds one training sample with weight `weight` at the mapped position `x`.
    pub fn accumulate(&mut self, x: f64, weight: f64) {
        let bin = self.locate(x);
        self.sum_f[bin] += weight;
        self.n_f[bin] += 1.0;
    }

    /// Given a random number `y` in [0, 1), finds the corresponding grid bin,
    /// the mapped value `x`, and the jacobian for this dimension.
    pub fn map(&self, y: f64) -> (usize, f64, f64) {
        let y_scaled = y * self.n_bins as f64;
        let bin_index = y_scaled.floor() as usize;
        let y_frac = y_scaled - bin_index as f64;

        let bin_index = bin_index.min(self.n_bins - 1);

        let x_low = self.edges[bin_index];
        let x_high = self.edges[bin_index + 1];
        let width = x_high - x_low;

        let x = x_low + y_frac * width;
        let jacobian = width * self.n_bins as f64;

        (bin_index, x, jacobian)
    }

    /// Maps a packet of four `y` values to `x` values and jacobians using SIMD.
    pub fn map_simd(&self, y_packet: f64x4) -> (f64x4, f64x4, [usize; 4]) {
        let n_bins_v = f64x4::splat(self.n_bins as f64);
        let y_scaled = y_packet * n_bins_v;
        let bin_indices_v = y_scaled.floor();
        let y_frac = y_scaled - bin_indices_v;

        let last = self.n_bins - 1;
        let bin_indices = bin_indices_v.to_array().map(|b| (b as usize).min(last));

        let x_low = f64x4::from(bin_indices.map(|b| self.edges[b]));
        let x_high = f64x4::from(bin_indices.map(|b| self.edges[b + 1]));

        let width = x_high - x_low;
        let x = x_low + y_frac * width;
        let jacobian = width * n_bins_v;

        (x, jacobian, bin_indices)
    }

    /// Re-partitions the grid into `n_bins` bins while keeping its current
    /// sampling density. Accumulated training data is discarded.
    pub fn rebin(&mut self, n_bins: usize) {
        assert!(n_bins > 0, "A grid needs at least one bin.");
        if n_bins != self.n_bins {
            let weights = vec![1.0; self.n_bins];
            let edges = redistribute(&self.edges, &weights, n_bins).unwrap_or_else(|| {
                (0..=n_bins).map(|i| i as f64 / n_bins as f64).collect()
            });
            *self = Self::with_edges(edges);
        } else {
            self.reset_importance_data();
        }
    }

    /// Refines the grid based on the accumulated training data.
    ///
    /// The per-bin importance is smoothed with its neighbours, normalized to
    /// the total and raised to `dampening`, and new edges are placed so that
    /// every new bin carries the same share. `n_bins == 0` keeps the current
    /// bin count. The accumulators are reset afterwards.
    pub fn refine(&mut self, dampening: f64, n_bins: usize) -> Refinement {
        let target_bins = if n_bins == 0 { self.n_bins } else { n_bins };

        if self.n_samples() == 0.0 {
            self.rebin(target_bins);
            return Refinement::Unchanged;
        }

        let smoothed = smooth(&self.sum_f);
        let total: f64 = smoothed.iter().sum();
        if !(total > 0.0 && total.is_finite()) {
            *self = Self::uniform(target_bins);
            return Refinement::Uniform;
        }

        let weights: Vec<f64> = smoothed
            .iter()
            .map(|&s| (s / total).powf(dampening))
            .collect();
        trace!("refine weights: {weights:?}");

        match redistribute(&self.edges, &weights, target_bins) {
            Some(edges) => {
                *self = Self::with_edges(edges);
                Refinement::Adapted
            }
            None => {
                // Collapsed edges: keep the old partition.
                self.rebin(target_bins);
                Refinement::Unchanged
            }
        }
    }
}

/// The serialized fields of a [`Grid`], checked before use.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct GridData {
    n_bins: usize,
    edges: Vec<f64>,
    sum_f: Vec<f64>,
    n_f: Vec<f64>,
}

impl TryFrom<GridData> for Grid {
    type Error = Error;

    fn try_from(data: GridData) -> Result<Self> {
        validate_edges(&data.edges).map_err(Error::CorruptState)?;
        let n_bins = data.edges.len() - 1;
        if data.n_bins != n_bins {
            return Err(Error::CorruptState(format!(
                "grid declares {} bins but has {} edges",
                data.n_bins,
                data.edges.len()
            )));
        }
        if data.sum_f.len() != n_bins || data.n_f.len() != n_bins {
            return Err(Error::CorruptState(format!(
                "training data for {} and {} bins in a {n_bins}-bin grid",
                data.sum_f.len(),
                data.n_f.len()
            )));
        }
        if data
            .sum_f
            .iter()
            .chain(&data.n_f)
            .any(|v| !(*v >= 0.0 && v.is_finite()))
        {
            return Err(Error::CorruptState(
                "training data must be finite and non-negative".to_string(),
            ));
        }
        Ok(Grid {
            n_bins,
            edges: data.edges,
            sum_f: data.sum_f,
            n_f: data.n_f,
        })
    }
}

/// Averages each bin with its neighbours; the outer bins have only one.
fn smooth(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return values.to_vec();
    }

    let mut smoothed = vec![0.0; n];
    smoothed[0] = (values[0] + values[1]) / 2.0;
    smoothed[n - 1] = (values[n - 2] + values[n - 1]) / 2.0;
    for i in 1..n - 1 {
        smoothed[i] = (values[i - 1] + values[i] + values[i + 1]) / 3.0;
    }
    smoothed
}

/// Places `n_new + 1` edges so that each new bin holds the same share of
/// `weights`, treating the weight as uniform inside every old bin.
///
/// Returns `None` if rounding made two new edges coincide.
fn redistribute(edges: &[f64], weights: &[f64], n_new: usize) -> Option<Vec<f64>> {
    let n_old = weights.len();
    let total: f64 = weights.iter().sum();
    let per_bin = total / n_new as f64;

    let mut new_edges = Vec::with_capacity(n_new + 1);
    new_edges.push(edges[0]);

    let mut cumulative = 0.0;
    let mut old = 0;
    for i in 1..n_new {
        let target = i as f64 * per_bin;
        while old < n_old - 1 && cumulative + weights[old] < target {
            cumulative += weights[old];
            old += 1;
        }

        let fraction = if weights[old] > 0.0 {
            ((target - cumulative) / weights[old]).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let width = edges[old + 1] - edges[old];
        new_edges.push(edges[old] + fraction * width);
    }
    new_edges.push(edges[n_old]);

    new_edges
        .windows(2)
        .all(|pair| pair[0] < pair[1])
        .then_some(new_edges)
}

/// Checks that `edges` is a valid partition of [0, 1].
pub(crate) fn validate_edges(edges: &[f64]) -> std::result::Result<(), String> {
    if edges.len() < 2 {
        return Err(format!("need at least two edges, got {}", edges.len()));
    }
    if edges[0] != 0.0 || edges[edges.len() - 1] != 1.0 {
        return Err(format!(
            "edges must span [0, 1], got [{}, {}]",
            edges[0],
            edges[edges.len() - 1]
        ));
    }
    if let Some(i) = edges.windows(2).position(|pair| !(pair[0] < pair[1])) {
        return Err(format!(
            "edges must be strictly increasing, got {} then {}",
            edges[i],
            edges[i + 1]
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn strictly_increasing(edges: &[f64]) -> bool {
        edges.windows(2).all(|pair| pair[0] < pair[1])
    }

    #[test]
    fn test_uniform_edges() {
        let grid = Grid::uniform(8);
        assert_eq!(grid.edges().len(), 9);
        assert_eq!(grid.edges()[0], 0.0);
        assert_eq!(grid.edges()[8], 1.0);
        for pair in grid.edges().windows(2) {
            assert_relative_eq!(pair[1] - pair[0], 0.125, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_locate_matches_edges() {
        let grid = Grid::from_edges(vec![0.0, 0.1, 0.5, 1.0]).unwrap();
        assert_eq!(grid.locate(0.0), 0);
        assert_eq!(grid.locate(0.09), 0);
        assert_eq!(grid.locate(0.1), 1);
        assert_eq!(grid.locate(0.7), 2);
        assert_eq!(grid.locate(1.0), 2);
    }

    #[test]
    fn test_map_simd_matches_scalar() {
        let grid = Grid::from_edges(vec![0.0, 0.05, 0.3, 0.9, 1.0]).unwrap();
        let ys = [0.0, 0.3, 0.61, 0.9999999];
        let (x, jac, bins) = grid.map_simd(f64x4::from(ys));
        let (x, jac) = (x.to_array(), jac.to_array());
        for k in 0..4 {
            let (bin, xs, js) = grid.map(ys[k]);
            assert_eq!(bins[k], bin);
            assert_relative_eq!(x[k], xs, epsilon = 1e-15);
            assert_relative_eq!(jac[k], js, epsilon = 1e-15);
        }
    }

    #[test]
    fn test_from_edges_rejects_bad_partitions() {
        assert!(Grid::from_edges(vec![0.0]).is_err());
        assert!(Grid::from_edges(vec![0.1, 1.0]).is_err());
        assert!(Grid::from_edges(vec![0.0, 0.6, 0.4, 1.0]).is_err());
        assert!(Grid::from_edges(vec![0.0, 0.5, 0.5, 1.0]).is_err());
    }

    #[test]
    fn test_smooth_uses_neighbours() {
        let smoothed = smooth(&[3.0, 0.0, 0.0, 1.0]);
        assert_relative_eq!(smoothed[0], 1.5);
        assert_relative_eq!(smoothed[1], 1.0);
        assert_relative_eq!(smoothed[2], 1.0 / 3.0);
        assert_relative_eq!(smoothed[3], 0.5);
    }

    #[test]
    fn test_refine_without_samples_keeps_edges() {
        let mut grid = Grid::from_edges(vec![0.0, 0.2, 0.7, 1.0]).unwrap();
        let before = grid.edges().to_vec();
        assert_eq!(grid.refine(1.0, 0), Refinement::Unchanged);
        assert_eq!(grid.edges(), &before[..]);
    }

    #[test]
    fn test_refine_zero_importance_falls_back_to_uniform() {
        let mut grid = Grid::from_edges(vec![0.0, 0.2, 0.7, 1.0]).unwrap();
        grid.accumulate(0.5, 0.0);
        assert_eq!(grid.refine(1.0, 0), Refinement::Uniform);
        assert_eq!(grid, Grid::uniform(3));
    }

    #[test]
    fn test_refine_zero_dampening_keeps_edges() {
        let mut grid = Grid::uniform(5);
        grid.accumulate(0.1, 10.0);
        grid.accumulate(0.95, 1.0);
        grid.refine(0.0, 0);
        for (a, b) in grid.edges().iter().zip(Grid::uniform(5).edges()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_refine_concentrates_edges() {
        let mut grid = Grid::uniform(10);
        for _ in 0..100 {
            grid.accumulate(0.05, 1.0);
        }
        grid.accumulate(0.55, 1.0);
        assert_eq!(grid.refine(1.0, 0), Refinement::Adapted);
        assert!(strictly_increasing(grid.edges()));
        assert!(grid.edges()[1] < 0.1);
        assert_eq!(grid.n_samples(), 0.0);
    }

    #[test]
    fn test_json_grid_is_validated() {
        let mut grid = Grid::from_edges(vec![0.0, 0.3, 1.0]).unwrap();
        grid.accumulate(0.4, 2.0);
        let json = serde_json::to_string(&grid).unwrap();
        assert_eq!(serde_json::from_str::<Grid>(&json).unwrap(), grid);

        for bad in [
            r#"{"n_bins":4,"edges":[0.0,1.0],"sum_f":[0.0],"n_f":[0.0]}"#,
            r#"{"n_bins":2,"edges":[0.0,0.7,0.5],"sum_f":[0.0,0.0],"n_f":[0.0,0.0]}"#,
            r#"{"n_bins":2,"edges":[0.0,0.5,1.0],"sum_f":[0.0],"n_f":[0.0,0.0]}"#,
            r#"{"n_bins":1,"edges":[0.0,1.0],"sum_f":[-1.0],"n_f":[1.0]}"#,
        ] {
            let err = serde_json::from_str::<Grid>(bad).unwrap_err();
            assert!(err.to_string().contains("corrupt state"), "{err}");
        }
    }

    #[test]
    fn test_rebin_preserves_density() {
        let mut grid = Grid::from_edges(vec![0.0, 0.2, 1.0]).unwrap();
        grid.rebin(4);
        assert_eq!(grid.n_bins(), 4);
        let expected = [0.0, 0.1, 0.2, 0.6, 1.0];
        for (a, b) in grid.edges().iter().zip(expected) {
            assert_relative_eq!(*a, b, epsilon = 1e-12);
        }
    }
}
