//! The VEGAS Monte Carlo driver.
//!
//! The driver closes the adaptive loop: it draws uniform points, warps them
//! through a [`Samplable`] map, evaluates the integrand, reports the squared
//! weighted values back to the map and lets the map adapt between iterations.

use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rayon::prelude::*;
use serde::Serialize;

use crate::adaptive_map::AdaptiveMap;
use crate::config::VegasConfig;
use crate::error::{Error, Result};
use crate::integrand::Integrand;
use crate::sampler::Samplable;

/// Stores the result of a VEGAS integration.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VegasResult {
    /// The estimated value of the integral.
    pub value: f64,
    /// The estimated statistical error (one standard deviation).
    pub error: f64,
    /// The chi-squared per degree of freedom of the partial results.
    pub chi2_dof: f64,
}

/// The VEGAS Monte Carlo integrator.
pub struct Vegas<M = AdaptiveMap> {
    pub(crate) config: VegasConfig,
    /// The random number generator.
    pub(crate) rng: Pcg64,
    /// The map that is trained during the integration.
    pub(crate) map: M,
    /// The integration boundaries for each dimension, as (min, max) tuples.
    boundaries: Vec<(f64, f64)>,
}

impl Vegas<AdaptiveMap> {
    /// Creates a new VEGAS integrator backed by a uniform [`AdaptiveMap`].
    ///
    /// # Arguments
    ///
    /// * `config`: The run settings; `config.n_bins` sizes the map.
    /// * `boundaries`: A slice of `(min, max)` tuples defining the integration domain for each dimension.
    pub fn new(config: VegasConfig, boundaries: &[(f64, f64)]) -> Result<Self> {
        config.validate()?;
        if boundaries.is_empty() {
            return Err(Error::InvalidArgument(
                "Number of dimensions must be positive.".to_string(),
            ));
        }
        let map = AdaptiveMap::new(boundaries.len(), config.n_bins);
        Self::with_map(config, map, boundaries)
    }
}

impl<M: Samplable + Sync> Vegas<M> {
    /// Creates a new VEGAS integrator that trains the given map.
    pub fn with_map(config: VegasConfig, map: M, boundaries: &[(f64, f64)]) -> Result<Self> {
        config.validate()?;
        if boundaries.len() != map.dims() {
            return Err(Error::InvalidArgument(format!(
                "{} boundaries given for a {}-dimensional map",
                boundaries.len(),
                map.dims()
            )));
        }
        if let Some(&(min, max)) = boundaries.iter().find(|(min, max)| !(min < max)) {
            return Err(Error::InvalidArgument(format!(
                "invalid integration boundary ({min}, {max})"
            )));
        }

        let rng = match config.seed {
            Some(seed) => Pcg64::seed_from_u64(seed),
            None => Pcg64::from_entropy(),
        };
        Ok(Vegas {
            config,
            rng,
            map,
            boundaries: boundaries.to_vec(),
        })
    }

    /// Sets the seed for the random number generator.
    pub fn set_seed(&mut self, seed: u64) {
        self.rng = Pcg64::seed_from_u64(seed);
    }

    /// Returns the number of dimensions of the integrator.
    pub fn dim(&self) -> usize {
        self.map.dims()
    }

    pub fn config(&self) -> &VegasConfig {
        &self.config
    }

    /// The map in its current state of training.
    pub fn map(&self) -> &M {
        &self.map
    }

    pub fn into_map(self) -> M {
        self.map
    }

    fn check_integrand<F: Integrand>(&self, integrand: &F) -> Result<()> {
        if integrand.dim() == self.dim() {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "Integrand dimension {} does not match integrator dimension {}.",
                integrand.dim(),
                self.dim()
            )))
        }
    }

    /// Integrates the given function using the VEGAS algorithm.
    ///
    /// The first iteration only trains the map; the remaining ones are
    /// combined into the final estimate.
    ///
    /// # Examples
    ///
    /// ```
    /// use nuchic::config::VegasConfig;
    /// use nuchic::integrand::Integrand;
    /// use nuchic::vegas::Vegas;
    ///
    /// struct MyIntegrand;
    ///
    /// impl Integrand for MyIntegrand {
    ///     fn dim(&self) -> usize {
    ///         2
    ///     }
    ///
    ///     fn eval(&self, x: &[f64]) -> f64 {
    ///         (-(x[0].powi(2)) - x[1].powi(2)).exp()
    ///     }
    /// }
    ///
    /// let config = VegasConfig {
    ///     n_iter: 10,
    ///     n_eval: 20_000,
    ///     seed: Some(1234),
    ///     ..VegasConfig::default()
    /// };
    /// let mut vegas = Vegas::new(config, &[(-1.0, 1.0), (-1.0, 1.0)]).unwrap();
    /// let result = vegas.integrate(&MyIntegrand).unwrap();
    ///
    /// assert!((result.value - 2.230985).abs() < 5. * result.error);
    /// ```
    pub fn integrate<F: Integrand + Sync>(&mut self, integrand: &F) -> Result<VegasResult> {
        self.check_integrand(integrand)?;

        let mut iter_results = Vec::new();
        let mut iter_errors = Vec::new();

        for iter in 0..self.config.n_iter {
            let (iter_val, iter_err) = self.run_iteration(integrand, self.config.n_eval)?;
            debug!("iteration {iter}: {iter_val} +/- {iter_err}");

            if iter > 0 {
                iter_results.push(iter_val);
                iter_errors.push(iter_err);

                if let Some(acc_req) = self.config.target_accuracy {
                    let current = self.combine_results(&iter_results, &iter_errors);
                    if reached_accuracy(&current, acc_req) {
                        info!("target accuracy {acc_req}% reached after {} iterations", iter + 1);
                        return Ok(current);
                    }
                }
            }

            self.map.refine(self.config.alpha)?;
        }

        // Combine results from all iterations (excluding warm-up)
        Ok(self.combine_results(&iter_results, &iter_errors))
    }

    /// Runs a single iteration: parallel evaluation, then sequential training.
    pub(crate) fn run_iteration<F: Integrand + Sync>(
        &mut self,
        integrand: &F,
        n_eval: usize,
    ) -> Result<(f64, f64)> {
        let dim = self.dim();
        let random_ys: Vec<Vec<f64>> = (0..n_eval)
            .map(|_| (0..dim).map(|_| self.rng.gen()).collect())
            .collect();

        let map = &self.map;
        let boundaries = &self.boundaries;
        let samples = random_ys
            .into_par_iter()
            .map(|y| {
                let (x_unit, jac_map) = map.map_sample(&y)?;
                let mut jacobian = jac_map;
                let point: Vec<f64> = x_unit
                    .iter()
                    .zip(boundaries)
                    .map(|(&x, &(min, max))| {
                        jacobian *= max - min;
                        min + x * (max - min)
                    })
                    .collect();

                Ok((x_unit, integrand.eval(&point) * jacobian))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut sum_f = 0.0;
        let mut sum_f2 = 0.0;
        let mut non_finite = 0usize;
        for (x_unit, weighted_f) in &samples {
            let weighted_f = if weighted_f.is_finite() {
                *weighted_f
            } else {
                non_finite += 1;
                0.0
            };
            let f2 = weighted_f * weighted_f;
            sum_f += weighted_f;
            sum_f2 += f2;
            self.map.train(x_unit, f2)?;
        }

        if non_finite > 0 {
            warn!("{non_finite} of {n_eval} integrand values were not finite and were counted as zero");
        }

        let avg_f = sum_f / n_eval as f64;
        let avg_f2 = sum_f2 / n_eval as f64;
        let variance = (avg_f2 - avg_f * avg_f) / (n_eval - 1).max(1) as f64;
        let error = if variance > 0.0 { variance.sqrt() } else { 0.0 };

        Ok((avg_f, error))
    }

    /// Combines the results from multiple iterations into a final estimate.
    pub(crate) fn combine_results(&self, values: &[f64], errors: &[f64]) -> VegasResult {
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;

        for (&val, &err) in values.iter().zip(errors.iter()) {
            if err > 0.0 {
                let weight = 1.0 / (err * err);
                weighted_sum += val * weight;
                total_weight += weight;
            }
        }

        if total_weight == 0.0 {
            return VegasResult::default();
        }

        let final_value = weighted_sum / total_weight;
        let final_error = (1.0 / total_weight).sqrt();

        let mut chi2 = 0.0;
        for (&val, &err) in values.iter().zip(errors.iter()) {
            if err > 0.0 {
                chi2 += ((val - final_value) / err).powi(2);
            }
        }
        let dof = values.len().saturating_sub(1).max(1) as f64;

        VegasResult {
            value: final_value,
            error: final_error,
            chi2_dof: chi2 / dof,
        }
    }
}

/// Whether the relative error, in percent, is below `acc_req`.
pub(crate) fn reached_accuracy(result: &VegasResult, acc_req: f64) -> bool {
    result.value != 0.0 && (result.error / result.value.abs()) * 100.0 < acc_req
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram_map::HistogramMap;

    // Integral of the form exp(-x^2 - y^2) in [-1, 1]^2.
    struct GaussianIntegrand;

    impl Integrand for GaussianIntegrand {
        fn dim(&self) -> usize {
            2
        }

        fn eval(&self, x: &[f64]) -> f64 {
            (-(x[0].powi(2)) - x[1].powi(2)).exp()
        }
    }

    const ANALYTICAL_RESULT: f64 = 2.230985;

    fn config() -> VegasConfig {
        VegasConfig {
            n_iter: 10,
            n_eval: 50_000,
            n_bins: 50,
            alpha: 0.5,
            seed: Some(1234),
            target_accuracy: None,
        }
    }

    #[test]
    fn test_integrate_gaussian() {
        let boundaries = &[(-1.0, 1.0), (-1.0, 1.0)];
        let mut vegas = Vegas::new(config(), boundaries).unwrap();
        let result = vegas.integrate(&GaussianIntegrand).unwrap();

        assert!(
            (result.value - ANALYTICAL_RESULT).abs() < 4.0 * result.error,
            "Analytical={} vs. nuchic={}+/-{}",
            ANALYTICAL_RESULT,
            result.value,
            result.error
        );
        assert!(result.chi2_dof < 3.0, "chi2_dof: {}", result.chi2_dof);
    }

    #[test]
    fn test_integrate_with_histogram_map() {
        let boundaries = &[(-1.0, 1.0), (-1.0, 1.0)];
        let map = HistogramMap::new(2, 16);
        let mut vegas = Vegas::with_map(config(), map, boundaries).unwrap();
        let result = vegas.integrate(&GaussianIntegrand).unwrap();

        assert!(
            (result.value - ANALYTICAL_RESULT).abs() < 5.0 * result.error,
            "Analytical={} vs. nuchic={}+/-{}",
            ANALYTICAL_RESULT,
            result.value,
            result.error
        );
        assert_eq!(vegas.map().bins(), 16);
    }

    #[test]
    fn test_same_seed_same_result() {
        let boundaries = &[(0.0, 1.0), (0.0, 1.0)];
        let config = VegasConfig {
            n_iter: 3,
            n_eval: 2_000,
            ..config()
        };
        let a = Vegas::new(config.clone(), boundaries)
            .unwrap()
            .integrate(&GaussianIntegrand)
            .unwrap();
        let b = Vegas::new(config, boundaries)
            .unwrap()
            .integrate(&GaussianIntegrand)
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_target_accuracy_stops_early() {
        let boundaries = &[(-1.0, 1.0), (-1.0, 1.0)];
        let config = VegasConfig {
            n_iter: 50,
            target_accuracy: Some(1.0),
            ..config()
        };
        let mut vegas = Vegas::new(config, boundaries).unwrap();
        let result = vegas.integrate(&GaussianIntegrand).unwrap();
        assert!(result.error / result.value * 100.0 < 1.0);
    }

    // NaN below x = 0.25, one elsewhere.
    struct PartlyUndefined;

    impl Integrand for PartlyUndefined {
        fn dim(&self) -> usize {
            2
        }

        fn eval(&self, x: &[f64]) -> f64 {
            if x[0] < 0.25 {
                f64::NAN
            } else {
                1.0
            }
        }
    }

    #[test]
    fn test_non_finite_values_count_as_zero() {
        let _ = env_logger::builder().is_test(true).try_init();
        let boundaries = &[(0.0, 1.0), (0.0, 1.0)];
        let mut vegas = Vegas::new(config(), boundaries).unwrap();
        let (value, error) = vegas.run_iteration(&PartlyUndefined, 20_000).unwrap();
        assert!(value.is_finite() && error.is_finite());
        assert!((value - 0.75).abs() < 5.0 * error, "{value} +/- {error}");

        let result = vegas.integrate(&PartlyUndefined).unwrap();
        assert!(result.value.is_finite());
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut vegas = Vegas::new(config(), &[(0.0, 1.0)]).unwrap();
        assert!(matches!(
            vegas.integrate(&GaussianIntegrand),
            Err(Error::InvalidArgument(_))
        ));
        assert!(Vegas::new(config(), &[]).is_err());
        assert!(Vegas::new(config(), &[(1.0, 0.0)]).is_err());
    }
}
