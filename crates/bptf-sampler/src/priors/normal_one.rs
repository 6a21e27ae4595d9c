//! Normal prior updated one latent dimension at a time
//!
//! Same hyperparameters as [`super::NormalPrior`], but each entity draw walks
//! the dimensions and samples each from its scalar conditional instead of
//! factorizing the D × D posterior precision.

use super::normal::{mu_lambda_status, restore_mu_lambda};
use super::{mismatched_state, sample_gaussian_by_coordinate, PriorState, SamplePrior};
use crate::block::EntityStats;
use crate::conjugate::{sample_cond_normal_wishart, NormalWishartPrior, SufficientStats};
use crate::model::{MatrixRecord, Model};
use bptf_core::{BptfResult, SamplerRng};
use scirs2_core::ndarray_ext::{Array1, Array2};

#[derive(Debug, Clone)]
pub struct NormalOnePrior {
    mode: usize,
    mu: Array1<f64>,
    lambda: Array2<f64>,
    hyper: NormalWishartPrior,
}

impl NormalOnePrior {
    pub fn new(mode: usize, num_latent: usize) -> Self {
        Self {
            mode,
            mu: Array1::zeros(num_latent),
            lambda: Array2::eye(num_latent),
            hyper: NormalWishartPrior::standard(num_latent),
        }
    }

    pub fn mu(&self) -> &Array1<f64> {
        &self.mu
    }

    pub fn lambda(&self) -> &Array2<f64> {
        &self.lambda
    }
}

impl SamplePrior for NormalOnePrior {
    fn mode(&self) -> usize {
        self.mode
    }

    fn name(&self) -> &'static str {
        "NormalOne"
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
        let precision = &self.lambda + &stats.precision;
        let h = self.lambda.dot(&self.mu) + &stats.rhs;
        let mut u = model.col(self.mode, entity).to_owned();
        sample_gaussian_by_coordinate(&mut u, &precision.view(), &h.view(), rng)?;
        Ok(u)
    }

    fn sample_hyper(&mut self, model: &mut Model, rng: &mut SamplerRng) -> BptfResult<()> {
        let stats = SufficientStats::from_columns(&model.factor(self.mode).view());
        let (mu, lambda) = sample_cond_normal_wishart(&stats, &self.hyper, rng)?;
        self.mu = mu;
        self.lambda = lambda;
        Ok(())
    }

    fn status(&self) -> String {
        format!(
            "NormalOne [mode {}]: {}",
            self.mode,
            mu_lambda_status(&self.mu, &self.lambda)
        )
    }

    fn save(&self) -> PriorState {
        PriorState::NormalOne {
            mu: self.mu.to_vec(),
            lambda: MatrixRecord::from_array(&self.lambda),
        }
    }

    fn restore(&mut self, state: &PriorState, _model: &Model) -> BptfResult<()> {
        let PriorState::NormalOne { mu, lambda } = state else {
            return Err(mismatched_state("normalone", state));
        };
        (self.mu, self.lambda) = restore_mu_lambda(mu, lambda, self.mu.len())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray_ext::array;

    #[test]
    fn test_entity_draw_uses_current_column() {
        let prior = NormalOnePrior::new(0, 2);
        let model = Model::from_factors(vec![array![[5.0], [5.0]]]).unwrap();
        let stats = EntityStats {
            precision: array![[1e6, 0.0], [0.0, 1e6]],
            rhs: array![2e6, 1e6],
        };
        let mut rng = SamplerRng::seed_from(0);
        let u = prior.sample_entity(0, &model, &stats, &mut rng).unwrap();
        assert!((u[0] - 2.0).abs() < 0.01);
        assert!((u[1] - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_rejects_other_state() {
        let mut prior = NormalOnePrior::new(0, 2);
        let model = Model::from_factors(vec![Array2::zeros((2, 1))]).unwrap();
        let state = NormalOnePrior::new(0, 3).save();
        assert!(prior.restore(&state, &model).unwrap_err().is_configuration());
    }
}
