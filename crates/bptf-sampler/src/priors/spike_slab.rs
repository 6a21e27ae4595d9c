//! Spike-and-slab prior
//!
//! Each latent coefficient is exactly zero (spike) or drawn from
//! `N(0, 1/α_d)` (slab); dimension `d` is active with probability `r_d`.
//! Inactive coefficients are stored as `0.0`, so the hyperparameter step
//! recovers the inclusion counts from the factor matrix itself.

use super::{expect_dim, mismatched_state, PriorState, SamplePrior};
use crate::block::EntityStats;
use crate::model::Model;
use bptf_core::{BptfError, BptfResult, SamplerRng};
use scirs2_core::ndarray_ext::Array1;

const MIN_RATE: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct SpikeAndSlabPrior {
    mode: usize,
    /// Inclusion probability per dimension
    r: Array1<f64>,
    /// Slab precision per dimension
    alpha: Array1<f64>,
}

impl SpikeAndSlabPrior {
    pub fn new(mode: usize, num_latent: usize) -> Self {
        Self {
            mode,
            r: Array1::from_elem(num_latent, 0.5),
            alpha: Array1::ones(num_latent),
        }
    }

    pub fn inclusion(&self) -> &Array1<f64> {
        &self.r
    }

    pub fn slab_precision(&self) -> &Array1<f64> {
        &self.alpha
    }
}

impl SamplePrior for SpikeAndSlabPrior {
    fn mode(&self) -> usize {
        self.mode
    }

    fn name(&self) -> &'static str {
        "SpikeAndSlab"
    }

    fn init(&mut self, _model: &mut Model, _rng: &mut SamplerRng) -> BptfResult<()> {
        Ok(())
    }

    fn sample_entity(
        &self,
        entity: usize,
        model: &Model,
        stats: &EntityStats,
        rng: &mut SamplerRng,
    ) -> BptfResult<Array1<f64>> {
        let mut u = model.col(self.mode, entity).to_owned();
        for d in 0..u.len() {
            let p = self.alpha[d] + stats.precision[[d, d]];
            if !(p.is_finite() && p > 0.0) {
                return Err(BptfError::numerical(format!(
                    "non-positive slab posterior precision {} in dimension {}",
                    p, d
                )));
            }
            let cross = stats.precision.row(d).dot(&u) - stats.precision[[d, d]] * u[d];
            let b = stats.rhs[d] - cross;

            let r = self.r[d].clamp(MIN_RATE, 1.0 - MIN_RATE);
            let log_odds = (r / (1.0 - r)).ln() + 0.5 * (self.alpha[d] / p).ln() + 0.5 * b * b / p;
            let include = rng.uniform() < 1.0 / (1.0 + (-log_odds).exp());

            u[d] = if include {
                b / p + rng.normal() / p.sqrt()
            } else {
                0.0
            };
        }
        Ok(u)
    }

    fn sample_hyper(&mut self, model: &mut Model, rng: &mut SamplerRng) -> BptfResult<()> {
        let factor = model.factor(self.mode);
        let n = factor.ncols() as f64;
        for (d, row) in factor.rows().into_iter().enumerate() {
            let active = row.iter().filter(|&&x| x != 0.0).count() as f64;
            let sumsq = row.dot(&row);
            self.r[d] = rng.beta(1.0 + active, 1.0 + n - active)?;
            self.alpha[d] = rng.gamma_rate(1.0 + 0.5 * active, 1.0 + 0.5 * sumsq)?;
        }
        Ok(())
    }

    fn status(&self) -> String {
        format!(
            "SpikeAndSlab [mode {}]: mean inclusion = {:.3}, mean slab precision = {:.4}",
            self.mode,
            self.r.mean().unwrap_or(0.0),
            self.alpha.mean().unwrap_or(0.0)
        )
    }

    fn save(&self) -> PriorState {
        PriorState::SpikeAndSlab {
            r: self.r.to_vec(),
            alpha: self.alpha.to_vec(),
        }
    }

    fn restore(&mut self, state: &PriorState, _model: &Model) -> BptfResult<()> {
        let PriorState::SpikeAndSlab { r, alpha } = state else {
            return Err(mismatched_state("spikeandslab", state));
        };
        expect_dim("inclusion rates", r.len(), self.r.len())?;
        expect_dim("slab precisions", alpha.len(), self.alpha.len())?;
        self.r = Array1::from_vec(r.clone());
        self.alpha = Array1::from_vec(alpha.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray_ext::{array, Array2};

    #[test]
    fn test_weak_evidence_switches_dimension_off() {
        let mut prior = SpikeAndSlabPrior::new(0, 2);
        prior.r = array![0.999, 1e-6];
        let model = Model::from_factors(vec![Array2::ones((2, 1))]).unwrap();
        let stats = EntityStats {
            precision: array![[100.0, 0.0], [0.0, 1.0]],
            rhs: array![300.0, 0.0],
        };
        let mut rng = SamplerRng::seed_from(6);
        for _ in 0..100 {
            let u = prior.sample_entity(0, &model, &stats, &mut rng).unwrap();
            assert!(u[0] != 0.0);
            assert!((u[0] - 3.0).abs() < 0.5);
            assert_eq!(u[1], 0.0);
        }
    }

    #[test]
    fn test_hyper_counts_active_coefficients() {
        let mut prior = SpikeAndSlabPrior::new(0, 2);
        // Row 0 fully active, row 1 always off
        let factor = Array2::from_shape_fn((2, 400), |(d, e)| {
            if d == 0 {
                1.0 + (e % 3) as f64
            } else {
                0.0
            }
        });
        let mut model = Model::from_factors(vec![factor]).unwrap();
        let mut rng = SamplerRng::seed_from(2);
        prior.sample_hyper(&mut model, &mut rng).unwrap();
        assert!(prior.inclusion()[0] > 0.95);
        assert!(prior.inclusion()[1] < 0.05);
        assert!(prior.slab_precision()[0] < 1.0);
    }

    #[test]
    fn test_save_restore() {
        let mut prior = SpikeAndSlabPrior::new(0, 3);
        prior.r = array![0.1, 0.2, 0.3];
        let model = Model::from_factors(vec![Array2::zeros((3, 1))]).unwrap();
        let mut fresh = SpikeAndSlabPrior::new(0, 3);
        fresh.restore(&prior.save(), &model).unwrap();
        assert_eq!(fresh.inclusion(), prior.inclusion());
    }
}
