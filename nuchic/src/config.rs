//! Run configuration for the Monte Carlo driver.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Settings for a [`crate::vegas::Vegas`] run.
///
/// Every field has a default, so a configuration file only needs the
/// values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VegasConfig {
    /// The number of iterations; the first one only trains the map.
    pub n_iter: usize,
    /// The number of integrand evaluations per iteration.
    pub n_eval: usize,
    /// The number of bins per dimension of the adaptive map.
    pub n_bins: usize,
    /// The damping exponent passed to the map after every iteration.
    pub alpha: f64,
    /// Seed for the random number generator; entropy when absent.
    pub seed: Option<u64>,
    /// Stop once the relative error (in percent) drops below this value.
    pub target_accuracy: Option<f64>,
}

impl Default for VegasConfig {
    fn default() -> Self {
        VegasConfig {
            n_iter: 10,
            n_eval: 10_000,
            n_bins: 50,
            alpha: 0.5,
            seed: None,
            target_accuracy: None,
        }
    }
}

impl VegasConfig {
    /// Parses a configuration from JSON and validates it.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: VegasConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.n_iter == 0 || self.n_eval == 0 || self.n_bins == 0 {
            return Err(Error::InvalidArgument(format!(
                "n_iter, n_eval and n_bins must be positive, got {}, {}, {}",
                self.n_iter, self.n_eval, self.n_bins
            )));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(Error::InvalidArgument(format!(
                "alpha must be between 0.0 and 1.0, got {}",
                self.alpha
            )));
        }
        if let Some(acc) = self.target_accuracy {
            if !(acc > 0.0) {
                return Err(Error::InvalidArgument(format!(
                    "target accuracy must be positive, got {acc}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = VegasConfig::from_json(r#"{"n_eval": 500, "seed": 7}"#).unwrap();
        assert_eq!(config.n_eval, 500);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.n_bins, VegasConfig::default().n_bins);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(VegasConfig::from_json(r#"{"alpha": 1.5}"#).is_err());
        assert!(VegasConfig::from_json(r#"{"n_bins": 0}"#).is_err());
        assert!(VegasConfig::from_json(r#"{"bins": 10}"#).is_err());
        assert!(VegasConfig::from_json("not json").is_err());
    }
}
