//! Observation noise models
//!
//! A noise model supplies the precision `α` used when an observation enters
//! a latent update. It is updated once per sweep by a single designated step
//! and read by every worker during the parallel entity phase.
//!
//! | variant    | `get_alpha`          | per-sweep update                                  |
//! |------------|----------------------|---------------------------------------------------|
//! | `Fixed`    | constant             | none                                              |
//! | `Sampled`  | current draw         | `α ~ Gamma(1 + n/2, rate 1 + SSE/2)`              |
//! | `Adaptive` | current draw         | `α ~ Gamma(1/2 + n/2, rate var/2 + SSE/2)`, capped |
//! | `Probit`   | 1                    | none; latent values resampled per observation      |

use bptf_core::{BptfError, BptfResult, DataSource, NoiseConfig, SamplerRng};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Residual statistics of one data block under the current model
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Residuals {
    /// Sum of squared errors over all observed cells
    pub sse: f64,
    /// Number of observed cells
    pub count: usize,
}

/// Noise state of one data block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NoiseModel {
    Fixed {
        precision: f64,
    },
    Sampled {
        alpha: f64,
    },
    Adaptive {
        sn_init: f64,
        sn_max: f64,
        /// Variance of the observed values, set by `init`
        var_total: f64,
        alpha: f64,
        alpha_max: f64,
    },
    Probit {
        threshold: f64,
    },
}

impl NoiseModel {
    pub fn from_config(config: &NoiseConfig) -> BptfResult<Self> {
        config.validate()?;
        Ok(match *config {
            NoiseConfig::Fixed { precision } => Self::Fixed { precision },
            NoiseConfig::Sampled { precision } => Self::Sampled { alpha: precision },
            NoiseConfig::Adaptive { sn_init, sn_max } => Self::Adaptive {
                sn_init,
                sn_max,
                var_total: 1.0,
                alpha: sn_init,
                alpha_max: sn_max,
            },
            NoiseConfig::Probit { threshold } => Self::Probit { threshold },
        })
    }

    /// One-time setup from the training data
    pub fn init(&mut self, data: &dyn DataSource) -> BptfResult<()> {
        match self {
            Self::Adaptive {
                sn_init,
                sn_max,
                var_total,
                alpha,
                alpha_max,
            } => {
                let (_, var) = data.value_moments();
                *var_total = if var > 0.0 { var } else { 1.0 };
                *alpha = *sn_init / *var_total;
                *alpha_max = *sn_max / *var_total;
            }
            Self::Probit { .. } if data.is_fully_observed() && !data.is_dense() => {
                return Err(BptfError::configuration(
                    "probit noise needs explicitly listed observations; \
                     sparse data with implicit zeros is not supported",
                ));
            }
            _ => {}
        }
        Ok(())
    }

    /// Resample the precision from the current residuals
    pub fn update(&mut self, residuals: &Residuals, rng: &mut SamplerRng) -> BptfResult<()> {
        let n = residuals.count as f64;
        match self {
            Self::Sampled { alpha } => {
                *alpha = rng.gamma_rate(1.0 + 0.5 * n, 1.0 + 0.5 * residuals.sse)?;
            }
            Self::Adaptive {
                var_total,
                alpha,
                alpha_max,
                ..
            } => {
                let draw = rng.gamma_rate(0.5 + 0.5 * n, 0.5 * *var_total + 0.5 * residuals.sse)?;
                *alpha = draw.min(*alpha_max);
            }
            Self::Fixed { .. } | Self::Probit { .. } => {}
        }
        Ok(())
    }

    /// Effective precision of a single observation
    pub fn get_alpha(&self) -> f64 {
        match *self {
            Self::Fixed { precision } => precision,
            Self::Sampled { alpha } | Self::Adaptive { alpha, .. } => alpha,
            Self::Probit { .. } => 1.0,
        }
    }

    /// Precision and effective target value for one observation
    ///
    /// Gaussian variants return `(α, value)`. Probit resamples the latent
    /// variable `z ~ N(prediction, 1)` truncated to `z > 0` when
    /// `value > threshold` and to `z < 0` otherwise.
    pub fn observation(&self, prediction: f64, value: f64, rng: &mut SamplerRng) -> (f64, f64) {
        match *self {
            Self::Probit { threshold } => {
                let z = if value > threshold {
                    rng.truncated_normal_positive(prediction)
                } else {
                    rng.truncated_normal_negative(prediction)
                };
                (1.0, z)
            }
            _ => (self.get_alpha(), value),
        }
    }

    /// Precision is the same for every observation in a sweep
    pub fn has_constant_alpha(&self) -> bool {
        !matches!(self, Self::Probit { .. })
    }

    pub fn is_probit(&self) -> bool {
        matches!(self, Self::Probit { .. })
    }

    /// Restore the sampled part of the state, keeping configured constants
    pub fn restore(&mut self, saved: &NoiseModel) -> BptfResult<()> {
        if std::mem::discriminant(self) != std::mem::discriminant(saved) {
            return Err(BptfError::configuration(format!(
                "checkpoint noise model '{}' does not match configured '{}'",
                saved, self
            )));
        }
        *self = saved.clone();
        Ok(())
    }
}

impl fmt::Display for NoiseModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed { precision } => write!(f, "Fixed: {:.2}", precision),
            Self::Sampled { alpha } => write!(f, "Sampled: {:.2}", alpha),
            Self::Adaptive {
                alpha, alpha_max, ..
            } => write!(f, "Adaptive: {:.2} (max {:.2})", alpha, alpha_max),
            Self::Probit { threshold } => write!(f, "Probit: threshold {:.2}", threshold),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bptf_core::ObservationSet;

    fn data() -> ObservationSet {
        ObservationSet::sparse(
            vec![2, 2],
            vec![(vec![0, 0], 1.0), (vec![0, 1], 3.0), (vec![1, 0], 5.0)],
        )
        .unwrap()
    }

    #[test]
    fn test_fixed_noise() {
        let noise = NoiseModel::from_config(&NoiseConfig::fixed(5.0)).unwrap();
        assert_eq!(noise.get_alpha(), 5.0);
        let mut rng = SamplerRng::seed_from(0);
        assert_eq!(noise.observation(0.3, 2.0, &mut rng), (5.0, 2.0));
        assert!(noise.has_constant_alpha());
    }

    #[test]
    fn test_adaptive_init_and_cap() {
        let mut noise = NoiseModel::from_config(&NoiseConfig::adaptive(1.0, 10.0)).unwrap();
        noise.init(&data()).unwrap();
        // values 1, 3, 5 -> population variance 8/3
        let var = 8.0 / 3.0;
        assert!((noise.get_alpha() - 1.0 / var).abs() < 1e-12);

        // Perfect fit drives the draw up; it must stay under sn_max / var
        let mut rng = SamplerRng::seed_from(3);
        for _ in 0..50 {
            noise.update(
                &Residuals {
                    sse: 0.0,
                    count: 10_000,
                },
                &mut rng,
            )
            .unwrap();
            assert!(noise.get_alpha() <= 10.0 / var + 1e-12);
        }
    }

    #[test]
    fn test_sampled_noise_tracks_residuals() {
        let mut noise = NoiseModel::from_config(&NoiseConfig::sampled(1.0)).unwrap();
        let mut rng = SamplerRng::seed_from(5);
        // residual variance 0.25 -> precision around 4
        let residuals = Residuals {
            sse: 0.25 * 5000.0,
            count: 5000,
        };
        let mut acc = 0.0;
        for _ in 0..100 {
            noise.update(&residuals, &mut rng).unwrap();
            acc += noise.get_alpha();
        }
        assert!((acc / 100.0 - 4.0).abs() < 0.2);
    }

    #[test]
    fn test_probit_latent_sign() {
        let noise = NoiseModel::from_config(&NoiseConfig::probit(0.5)).unwrap();
        let mut rng = SamplerRng::seed_from(1);
        for _ in 0..500 {
            let (alpha, z) = noise.observation(-2.0, 1.0, &mut rng);
            assert_eq!(alpha, 1.0);
            assert!(z > 0.0);
            let (_, z) = noise.observation(2.0, 0.0, &mut rng);
            assert!(z < 0.0);
        }
        assert!(!noise.has_constant_alpha());
    }

    #[test]
    fn test_probit_rejects_implicit_zeros() {
        let mut noise = NoiseModel::from_config(&NoiseConfig::probit(0.0)).unwrap();
        let err = noise.init(&data().with_implicit_zeros()).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_restore_requires_same_variant() {
        let mut noise = NoiseModel::from_config(&NoiseConfig::sampled(1.0)).unwrap();
        assert!(noise.restore(&NoiseModel::Sampled { alpha: 7.0 }).is_ok());
        assert_eq!(noise.get_alpha(), 7.0);
        assert!(noise
            .restore(&NoiseModel::Fixed { precision: 1.0 })
            .unwrap_err()
            .is_configuration());
    }
}
