//! Noise configuration attached to each observation source

use crate::error::{BptfError, BptfResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default precision for fixed Gaussian noise
pub const DEFAULT_PRECISION: f64 = 5.0;
/// Default initial signal-to-noise ratio for adaptive noise
pub const DEFAULT_SN_INIT: f64 = 1.0;
/// Default maximum signal-to-noise ratio for adaptive noise
pub const DEFAULT_SN_MAX: f64 = 10.0;
/// Default probit threshold
pub const DEFAULT_THRESHOLD: f64 = 0.0;

/// How the observation precision of a data source is modelled
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoiseConfig {
    /// Constant Gaussian precision
    Fixed { precision: f64 },
    /// Gaussian precision resampled from its Gamma posterior every sweep
    Sampled { precision: f64 },
    /// Precision resampled every sweep, scaled by the data variance and
    /// capped at `sn_max / var`
    Adaptive { sn_init: f64, sn_max: f64 },
    /// Binary observations through a probit link
    Probit { threshold: f64 },
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self::Fixed {
            precision: DEFAULT_PRECISION,
        }
    }
}

impl NoiseConfig {
    pub fn fixed(precision: f64) -> Self {
        Self::Fixed { precision }
    }

    pub fn sampled(precision: f64) -> Self {
        Self::Sampled { precision }
    }

    pub fn adaptive(sn_init: f64, sn_max: f64) -> Self {
        Self::Adaptive { sn_init, sn_max }
    }

    pub fn probit(threshold: f64) -> Self {
        Self::Probit { threshold }
    }

    /// Check that all parameters are finite and in range
    pub fn validate(&self) -> BptfResult<()> {
        match *self {
            Self::Fixed { precision } | Self::Sampled { precision } => {
                if !(precision.is_finite() && precision > 0.0) {
                    return Err(BptfError::configuration(format!(
                        "noise precision must be positive and finite, got {}",
                        precision
                    )));
                }
            }
            Self::Adaptive { sn_init, sn_max } => {
                if !(sn_init.is_finite() && sn_init > 0.0) {
                    return Err(BptfError::configuration(format!(
                        "adaptive noise sn_init must be positive, got {}",
                        sn_init
                    )));
                }
                if !(sn_max.is_finite() && sn_max >= sn_init) {
                    return Err(BptfError::configuration(format!(
                        "adaptive noise sn_max ({}) must be >= sn_init ({})",
                        sn_max, sn_init
                    )));
                }
            }
            Self::Probit { threshold } => {
                if !threshold.is_finite() {
                    return Err(BptfError::configuration("probit threshold must be finite"));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for NoiseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed { precision } => write!(f, "fixed(precision = {})", precision),
            Self::Sampled { precision } => write!(f, "sampled(init = {})", precision),
            Self::Adaptive { sn_init, sn_max } => {
                write!(f, "adaptive(sn_init = {}, sn_max = {})", sn_init, sn_max)
            }
            Self::Probit { threshold } => write!(f, "probit(threshold = {})", threshold),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(NoiseConfig::default().validate().is_ok());
        assert!(NoiseConfig::fixed(0.0).validate().is_err());
        assert!(NoiseConfig::adaptive(1.0, 10.0).validate().is_ok());
        assert!(NoiseConfig::adaptive(5.0, 1.0).validate().is_err());
        assert!(NoiseConfig::probit(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_serde_tagged() {
        let json = serde_json::to_string(&NoiseConfig::adaptive(1.0, 10.0)).unwrap();
        assert!(json.contains("\"kind\":\"adaptive\""));
        let back: NoiseConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NoiseConfig::adaptive(1.0, 10.0));
    }
}
