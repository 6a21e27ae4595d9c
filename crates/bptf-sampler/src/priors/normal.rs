//! Normal prior with Normal-Wishart hyperprior

use super::{expect_dim, mismatched_state, sample_gaussian_canonical, PriorState, SamplePrior};
use crate::block::EntityStats;
use crate::conjugate::{sample_cond_normal_wishart, NormalWishartPrior, SufficientStats};
use crate::model::{MatrixRecord, Model};
use bptf_core::{BptfResult, SamplerRng};
use scirs2_core::ndarray_ext::{Array1, Array2};

/// `u_e ~ N(μ, Λ⁻¹)` with `(μ, Λ)` redrawn every sweep
#[derive(Debug, Clone)]
pub struct NormalPrior {
    mode: usize,
    mu: Array1<f64>,
    lambda: Array2<f64>,
    hyper: NormalWishartPrior,
}

impl NormalPrior {
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

/// Shared by the two Normal-Wishart priors
pub(super) fn restore_mu_lambda(
    mu: &[f64],
    lambda: &MatrixRecord,
    num_latent: usize,
) -> BptfResult<(Array1<f64>, Array2<f64>)> {
    expect_dim("prior mean", mu.len(), num_latent)?;
    let lambda = lambda.to_array()?;
    expect_dim("prior precision", lambda.nrows(), num_latent)?;
    expect_dim("prior precision", lambda.ncols(), num_latent)?;
    Ok((Array1::from_vec(mu.to_vec()), lambda))
}

pub(super) fn mu_lambda_status(mu: &Array1<f64>, lambda: &Array2<f64>) -> String {
    format!(
        "|mu| = {:.4}, trace(Lambda) = {:.4}",
        mu.dot(mu).sqrt(),
        lambda.diag().sum()
    )
}

impl SamplePrior for NormalPrior {
    fn mode(&self) -> usize {
        self.mode
    }

    fn name(&self) -> &'static str {
        "Normal"
    }

    fn init(&mut self, _model: &mut Model, _rng: &mut SamplerRng) -> BptfResult<()> {
        Ok(())
    }

    fn sample_entity(
        &self,
        _entity: usize,
        _model: &Model,
        stats: &EntityStats,
        rng: &mut SamplerRng,
    ) -> BptfResult<Array1<f64>> {
        let precision = &self.lambda + &stats.precision;
        let h = self.lambda.dot(&self.mu) + &stats.rhs;
        sample_gaussian_canonical(&precision.view(), &h.view(), rng)
    }

    fn sample_hyper(&mut self, model: &mut Model, rng: &mut SamplerRng) -> BptfResult<()> {
        let stats = SufficientStats::from_columns(&model.factor(self.mode).view());
        let (mu, lambda) = sample_cond_normal_wishart(&stats, &self.hyper, rng)?;
        self.mu = mu;
        self.lambda = lambda;
        Ok(())
    }

    fn status(&self) -> String {
        format!("Normal [mode {}]: {}", self.mode, mu_lambda_status(&self.mu, &self.lambda))
    }

    fn save(&self) -> PriorState {
        PriorState::Normal {
            mu: self.mu.to_vec(),
            lambda: MatrixRecord::from_array(&self.lambda),
        }
    }

    fn restore(&mut self, state: &PriorState, _model: &Model) -> BptfResult<()> {
        let PriorState::Normal { mu, lambda } = state else {
            return Err(mismatched_state("normal", state));
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
    fn test_entity_draw_concentrates_on_data() {
        let prior = NormalPrior::new(0, 2);
        let model = Model::from_factors(vec![Array2::zeros((2, 1))]).unwrap();
        // Strong likelihood around u = [1, -2]
        let stats = EntityStats {
            precision: array![[1e6, 0.0], [0.0, 1e6]],
            rhs: array![1e6, -2e6],
        };
        let mut rng = SamplerRng::seed_from(4);
        let u = prior.sample_entity(0, &model, &stats, &mut rng).unwrap();
        assert!((u[0] - 1.0).abs() < 0.01);
        assert!((u[1] + 2.0).abs() < 0.01);
    }

    #[test]
    fn test_hyper_tracks_factor_mean() {
        let mut prior = NormalPrior::new(0, 2);
        let factor = Array2::from_shape_fn((2, 500), |(d, _)| if d == 0 { 3.0 } else { -1.0 });
        let mut model = Model::from_factors(vec![factor]).unwrap();
        let mut rng = SamplerRng::seed_from(8);
        prior.sample_hyper(&mut model, &mut rng).unwrap();
        assert!((prior.mu()[0] - 3.0).abs() < 0.1);
        assert!((prior.mu()[1] + 1.0).abs() < 0.1);
    }

    #[test]
    fn test_save_restore() {
        let mut prior = NormalPrior::new(1, 2);
        prior.mu = array![0.5, 0.25];
        prior.lambda = array![[2.0, 0.1], [0.1, 3.0]];
        let saved = prior.save();
        let model = Model::from_factors(vec![Array2::zeros((2, 1)), Array2::zeros((2, 1))]).unwrap();
        let mut fresh = NormalPrior::new(1, 2);
        fresh.restore(&saved, &model).unwrap();
        assert_eq!(fresh.mu(), prior.mu());
        assert_eq!(fresh.lambda(), prior.lambda());

        let wrong = PriorState::SpikeAndSlab {
            r: vec![0.5; 2],
            alpha: vec![1.0; 2],
        };
        assert!(fresh.restore(&wrong, &model).unwrap_err().is_configuration());
    }
}
