//! A histogram map with online adaptation and bin splitting.
//!
//! All edges live in one flat vector, dimension after dimension, so that the
//! edges of bin `bin` in dimension `dim` sit at `dim * (bins + 1) + bin` and
//! `dim * (bins + 1) + bin + 1`. Instead of redistributing all edges at once,
//! the map nudges single edges towards observed points and can refine itself
//! by splitting every bin.

use std::io::{Read, Write};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::grid::validate_edges;
use crate::sampler::Samplable;

/// How many pieces [`HistogramMap::split`] cuts every bin into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Split {
    /// One new edge at the midpoint.
    #[default]
    Half,
    /// Two new edges at 1/3 and 2/3.
    Third,
    /// Three new edges at the quartiles.
    Quarter,
}

impl Split {
    pub fn factor(self) -> usize {
        match self {
            Split::Half => 2,
            Split::Third => 3,
            Split::Quarter => 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HistogramData")]
pub struct HistogramMap {
    hist: Vec<f64>,
    dims: usize,
    bins: usize,
    /// Weighted points reported through [`Samplable::train`].
    #[serde(skip)]
    pending: Vec<(Vec<f64>, f64)>,
}

impl HistogramMap {
    /// Creates a map with `bins` uniform bins in each of `dims` dimensions.
    ///
    /// # Panics
    ///
    /// Panics if `dims` or `bins` is zero.
    pub fn new(dims: usize, bins: usize) -> Self {
        assert!(dims > 0, "Number of dimensions must be positive.");
        assert!(bins > 0, "Number of bins must be positive.");
        let row: Vec<f64> = (0..=bins).map(|i| i as f64 / bins as f64).collect();
        HistogramMap {
            hist: row.repeat(dims),
            dims,
            bins,
            pending: Vec::new(),
        }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn bins(&self) -> usize {
        self.bins
    }

    /// All edges in flat layout.
    pub fn edges(&self) -> &[f64] {
        &self.hist
    }

    /// The `bins + 1` edges of dimension `dim`.
    pub fn dim_edges(&self, dim: usize) -> &[f64] {
        let offset = dim * (self.bins + 1);
        &self.hist[offset..offset + self.bins + 1]
    }

    fn index(&self, dim: usize, bin: usize) -> usize {
        assert!(
            dim < self.dims && bin < self.bins,
            "bin ({dim}, {bin}) out of bounds for a {}x{} map",
            self.dims,
            self.bins
        );
        dim * (self.bins + 1) + bin
    }

    /// # Panics
    ///
    /// Panics if `dim >= dims` or `bin >= bins`.
    pub fn lower_edge(&self, dim: usize, bin: usize) -> f64 {
        self.hist[self.index(dim, bin)]
    }

    /// # Panics
    ///
    /// Panics if `dim >= dims` or `bin >= bins`.
    pub fn upper_edge(&self, dim: usize, bin: usize) -> f64 {
        self.hist[self.index(dim, bin) + 1]
    }

    /// # Panics
    ///
    /// Panics if `dim >= dims` or `bin >= bins`.
    pub fn width(&self, dim: usize, bin: usize) -> f64 {
        self.upper_edge(dim, bin) - self.lower_edge(dim, bin)
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

    /// Maps a uniform draw in place and returns the jacobian.
    ///
    /// `point` is overwritten with the warped coordinates. Nothing is written
    /// if any coordinate lies outside `[0, 1)`.
    pub fn map_in_place(&self, point: &mut [f64]) -> Result<f64> {
        self.check_len(point)?;
        if let Some(dim) = point.iter().position(|y| !(0.0..1.0).contains(y)) {
            return Err(Error::OutOfRange {
                dim,
                value: point[dim],
            });
        }

        let n_bins = self.bins as f64;
        let mut jacobian = 1.0;
        for (dim, y) in point.iter_mut().enumerate() {
            let y_scaled = *y * n_bins;
            let bin = (y_scaled.floor() as usize).min(self.bins - 1);
            let frac = y_scaled - bin as f64;

            let width = self.width(dim, bin);
            *y = self.lower_edge(dim, bin) + frac * width;
            jacobian *= width * n_bins;
        }
        Ok(jacobian)
    }

    /// Nudges the grid towards a single observed point.
    ///
    /// In every dimension the interior edge of the point's bin that is closest
    /// to the point moves to `edge * (1 - rate) + point * rate`. A move that
    /// would not keep the edges strictly increasing is skipped.
    pub fn adapt(&mut self, rate: f64, point: &[f64]) -> Result<()> {
        if !(rate > 0.0 && rate <= 1.0) {
            return Err(Error::InvalidArgument(format!(
                "adaptation rate must be in (0, 1], got {rate}"
            )));
        }
        self.check_len(point)?;
        if let Some(dim) = point.iter().position(|x| !(0.0..=1.0).contains(x)) {
            return Err(Error::OutOfRange {
                dim,
                value: point[dim],
            });
        }

        let bins = self.bins;
        for (dim, &p) in point.iter().enumerate() {
            let offset = dim * (bins + 1);
            let edges = &mut self.hist[offset..offset + bins + 1];

            let bin = edges
                .partition_point(|&edge| edge <= p)
                .saturating_sub(1)
                .min(bins - 1);

            let idx = match (bin > 0, bin + 1 < bins) {
                (true, true) => {
                    if p - edges[bin] <= edges[bin + 1] - p {
                        bin
                    } else {
                        bin + 1
                    }
                }
                (true, false) => bin,
                (false, true) => bin + 1,
                (false, false) => continue,
            };

            let moved = edges[idx] * (1.0 - rate) + p * rate;
            if edges[idx - 1] < moved && moved < edges[idx + 1] {
                edges[idx] = moved;
            }
        }
        Ok(())
    }

    /// Splits every bin of every dimension, multiplying the bin count by
    /// `split.factor()`. Existing edges are kept unchanged.
    ///
    /// Fails without touching the map if a bin is too narrow for its new
    /// edges to stay strictly increasing in floating point.
    pub fn split(&mut self, split: Split) -> Result<()> {
        let factor = split.factor();
        let new_bins = self.bins * factor;
        let mut hist = Vec::with_capacity(self.dims * (new_bins + 1));

        for dim in 0..self.dims {
            for bin in 0..self.bins {
                let lower = self.lower_edge(dim, bin);
                let upper = self.upper_edge(dim, bin);
                let width = upper - lower;
                hist.push(lower);
                for j in 1..factor {
                    let edge = lower + j as f64 / factor as f64 * width;
                    let previous = hist[hist.len() - 1];
                    if !(previous < edge && edge < upper) {
                        return Err(Error::InvalidArgument(format!(
                            "bin {bin} of dimension {dim} ([{lower:e}, {upper:e}]) is too narrow to split into {factor}"
                        )));
                    }
                    hist.push(edge);
                }
            }
            hist.push(self.upper_edge(dim, self.bins - 1));
        }

        debug!("split {} -> {} bins", self.bins, new_bins);
        self.hist = hist;
        self.bins = new_bins;
        Ok(())
    }

    /// Writes the map as text: the dimension and bin counts followed by the
    /// edges, one dimension per line.
    pub fn serialize<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "{} {}", self.dims, self.bins)?;
        for dim in 0..self.dims {
            let line: Vec<String> = self
                .dim_edges(dim)
                .iter()
                .map(|edge| format!("{edge:e}"))
                .collect();
            writeln!(out, "{}", line.join(" "))?;
        }
        Ok(())
    }

    /// Restores a map written by [`HistogramMap::serialize`].
    pub fn deserialize<R: Read>(mut input: R) -> Result<Self> {
        let mut text = String::new();
        input.read_to_string(&mut text)?;
        let mut tokens = text.split_whitespace();

        let mut header = |name: &str| -> Result<usize> {
            let token = tokens
                .next()
                .ok_or_else(|| Error::CorruptState(format!("missing {name}")))?;
            match token.parse::<usize>() {
                Ok(value) if value > 0 => Ok(value),
                _ => Err(Error::CorruptState(format!("invalid {name}: {token:?}"))),
            }
        };
        let dims = header("dimension count")?;
        let bins = header("bin count")?;

        let hist = tokens
            .map(|token| {
                token
                    .parse::<f64>()
                    .map_err(|_| Error::CorruptState(format!("invalid edge: {token:?}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::from_parts(dims, bins, hist)
    }

    /// Builds a map from its flat edges, checking them against the counts.
    fn from_parts(dims: usize, bins: usize, hist: Vec<f64>) -> Result<Self> {
        if dims == 0 || bins == 0 {
            return Err(Error::CorruptState(format!(
                "dimension and bin counts must be positive, got {dims}x{bins}"
            )));
        }
        let expected = bins
            .checked_add(1)
            .and_then(|row| row.checked_mul(dims))
            .ok_or_else(|| Error::CorruptState("header counts overflow".to_string()))?;
        if hist.len() != expected {
            return Err(Error::CorruptState(format!(
                "header declares {dims}x{bins} bins ({expected} edges), found {} edges",
                hist.len()
            )));
        }

        for (dim, row) in hist.chunks(bins + 1).enumerate() {
            validate_edges(row)
                .map_err(|msg| Error::CorruptState(format!("dimension {dim}: {msg}")))?;
        }

        Ok(HistogramMap {
            hist,
            dims,
            bins,
            pending: Vec::new(),
        })
    }
}

/// The serialized fields of a [`HistogramMap`], checked before use.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct HistogramData {
    hist: Vec<f64>,
    dims: usize,
    bins: usize,
}

impl TryFrom<HistogramData> for HistogramMap {
    type Error = Error;

    fn try_from(data: HistogramData) -> Result<Self> {
        HistogramMap::from_parts(data.dims, data.bins, data.hist)
    }
}

impl Samplable for HistogramMap {
    fn dims(&self) -> usize {
        self.dims
    }

    fn bins(&self) -> usize {
        self.bins
    }

    fn map_sample(&self, y: &[f64]) -> Result<(Vec<f64>, f64)> {
        let mut point = y.to_vec();
        let jacobian = self.map_in_place(&mut point)?;
        Ok((point, jacobian))
    }

    fn train(&mut self, point: &[f64], weight: f64) -> Result<()> {
        self.check_len(point)?;
        if !(weight >= 0.0 && weight.is_finite()) {
            return Err(Error::InvalidArgument(format!(
                "training weight must be finite and non-negative, got {weight}"
            )));
        }
        self.pending.push((point.to_vec(), weight));
        Ok(())
    }

    /// Replays the buffered points through [`HistogramMap::adapt`], scaling
    /// `rate` by each weight relative to the heaviest one.
    fn refine(&mut self, rate: f64) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        let max_weight = pending.iter().map(|(_, w)| *w).fold(0.0, f64::max);
        if rate == 0.0 || max_weight <= 0.0 {
            return Ok(());
        }

        for (point, weight) in &pending {
            let scaled = rate * weight / max_weight;
            if scaled > 0.0 {
                self.adapt(scaled, point)?;
            }
        }
        Ok(())
    }
}
