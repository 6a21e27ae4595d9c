//! Macau prior with independent latent dimensions
//!
//! The diagonal counterpart of [`super::MacauPrior`]: each latent dimension
//! `d` has its own mean `μ_d`, precision `Λ_d` (Normal-Gamma hyperprior) and
//! ridge weight `λβ_d`, and its column `β_d` of the link matrix is drawn from
//! a separate scalar-noise ridge regression
//!
//! ```text
//! (FᵀF + λβ_d I) β_d = Fᵀ(u_d − μ_d + e₁) + √λβ_d · e₂,    e ~ N(0, 1/Λ_d)
//! ```
//!
//! Entities are updated one dimension at a time.

use super::{expect_dim, mismatched_state, sample_gaussian_by_coordinate, PriorState, SamplePrior};
use crate::block::EntityStats;
use crate::conjugate::{sample_normal_gamma, NormalGammaPrior};
use crate::model::Model;
use crate::side_info::SideInfo;
use bptf_core::{BptfError, BptfResult, SamplerRng};
use scirs2_core::ndarray_ext::{s, Array1, Array2};

/// Gamma hyperprior on each `λβ_d`
const LAMBDA_BETA_A0: f64 = 0.1;
const LAMBDA_BETA_B0: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct MacauOnePrior {
    mode: usize,
    mu: Array1<f64>,
    /// Diagonal precision
    lambda: Array1<f64>,
    lambda_beta: Array1<f64>,
    hyper: NormalGammaPrior,
    side_info: SideInfo,
    /// `βᵀFᵀ`, D × N
    uhat: Array2<f64>,
}

impl MacauOnePrior {
    pub fn new(mode: usize, num_latent: usize, side_info: SideInfo) -> Self {
        let lambda_beta = Array1::from_elem(num_latent, side_info.lambda_beta());
        let n = side_info.row_count();
        Self {
            mode,
            mu: Array1::zeros(num_latent),
            lambda: Array1::ones(num_latent),
            lambda_beta,
            hyper: NormalGammaPrior::default(),
            side_info,
            uhat: Array2::zeros((num_latent, n)),
        }
    }

    pub fn lambda_beta(&self) -> &Array1<f64> {
        &self.lambda_beta
    }

    pub fn precision(&self) -> &Array1<f64> {
        &self.lambda
    }

    fn sample_beta(&self, model: &Model, rng: &mut SamplerRng) -> BptfResult<Array2<f64>> {
        let u = model.factor(self.mode);
        let (num_latent, n) = u.dim();
        let nfeat = self.side_info.num_features();
        let features = self.side_info.features();
        let current = model.link_matrix(self.mode).map(|l| l.beta.clone());

        let mut beta = Array2::<f64>::zeros((nfeat, num_latent));
        for d in 0..num_latent {
            let sd = 1.0 / self.lambda[d].sqrt();
            let mut target = Array2::<f64>::zeros((n, 1));
            for (e, t) in target.column_mut(0).iter_mut().enumerate() {
                *t = u[[d, e]] - self.mu[d] + sd * rng.normal();
            }
            let mut rhs = features.t_mul(&target.view())?;
            let ridge_sd = self.lambda_beta[d].sqrt() * sd;
            for r in rhs.iter_mut() {
                *r += ridge_sd * rng.normal();
            }
            let warm = current.as_ref().map(|b| b.slice(s![.., d..d + 1]));
            let solved = self
                .side_info
                .solve_ridge(&rhs.view(), self.lambda_beta[d], warm.as_ref())?;
            beta.column_mut(d).assign(&solved.column(0));
        }
        Ok(beta)
    }
}

impl SamplePrior for MacauOnePrior {
    fn mode(&self) -> usize {
        self.mode
    }

    fn name(&self) -> &'static str {
        "MacauOne"
    }

    fn init(&mut self, model: &mut Model, _rng: &mut SamplerRng) -> BptfResult<()> {
        let n = model.factor(self.mode).ncols();
        self.side_info.validate(self.mode, n)?;
        let beta = Array2::zeros((self.side_info.num_features(), model.num_latent()));
        model.set_link_matrix(self.mode, beta, self.mu.clone());
        self.uhat = Array2::zeros((model.num_latent(), n));
        Ok(())
    }

    fn sample_entity(
        &self,
        entity: usize,
        model: &Model,
        stats: &EntityStats,
        rng: &mut SamplerRng,
    ) -> BptfResult<Array1<f64>> {
        let mut precision = stats.precision.clone();
        for d in 0..self.lambda.len() {
            precision[[d, d]] += self.lambda[d];
        }
        let mean = &self.mu + &self.uhat.column(entity);
        let h = &self.lambda * &mean + &stats.rhs;
        let mut u = model.col(self.mode, entity).to_owned();
        sample_gaussian_by_coordinate(&mut u, &precision.view(), &h.view(), rng)?;
        Ok(u)
    }

    fn sample_hyper(&mut self, model: &mut Model, rng: &mut SamplerRng) -> BptfResult<()> {
        let beta = self.sample_beta(model, rng)?;
        self.uhat = self.side_info.features().mul(&beta.view())?.reversed_axes();

        let u = model.factor(self.mode);
        let n = u.ncols();
        for d in 0..self.mu.len() {
            let residual = &u.row(d) - &self.uhat.row(d);
            let (mu, lambda) = sample_normal_gamma(
                n,
                residual.sum(),
                residual.dot(&residual),
                &self.hyper,
                rng,
            )?;
            self.mu[d] = mu;
            self.lambda[d] = lambda;
        }

        if self.side_info.samples_lambda_beta() {
            let nfeat = self.side_info.num_features() as f64;
            for (d, column) in beta.columns().into_iter().enumerate() {
                let rate = LAMBDA_BETA_B0 + 0.5 * self.lambda[d] * column.dot(&column);
                self.lambda_beta[d] = rng.gamma_rate(LAMBDA_BETA_A0 + 0.5 * nfeat, rate)?;
            }
        }
        model.set_link_matrix(self.mode, beta, self.mu.clone());
        Ok(())
    }

    fn status(&self) -> String {
        format!(
            "MacauOne [mode {}]: |mu| = {:.4}, mean Lambda = {:.4}, mean lambda_beta = {:.4}",
            self.mode,
            self.mu.dot(&self.mu).sqrt(),
            self.lambda.mean().unwrap_or(0.0),
            self.lambda_beta.mean().unwrap_or(0.0)
        )
    }

    fn save(&self) -> PriorState {
        PriorState::MacauOne {
            mu: self.mu.to_vec(),
            lambda: self.lambda.to_vec(),
            lambda_beta: self.lambda_beta.to_vec(),
        }
    }

    fn restore(&mut self, state: &PriorState, model: &Model) -> BptfResult<()> {
        let PriorState::MacauOne {
            mu,
            lambda,
            lambda_beta,
        } = state
        else {
            return Err(mismatched_state("macauone", state));
        };
        let d = self.mu.len();
        expect_dim("prior mean", mu.len(), d)?;
        expect_dim("prior precision", lambda.len(), d)?;
        expect_dim("link precision", lambda_beta.len(), d)?;
        let beta = model
            .link_matrix(self.mode)
            .map(|l| l.beta.clone())
            .ok_or_else(|| {
                BptfError::configuration(format!("checkpoint has no link matrix for mode {}", self.mode))
            })?;
        expect_dim("link matrix", beta.nrows(), self.side_info.num_features())?;
        expect_dim("link matrix", beta.ncols(), d)?;

        self.mu = Array1::from_vec(mu.clone());
        self.lambda = Array1::from_vec(lambda.clone());
        self.lambda_beta = Array1::from_vec(lambda_beta.clone());
        self.uhat = self.side_info.features().mul(&beta.view())?.reversed_axes();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray_ext::array;

    fn features() -> Array2<f64> {
        Array2::from_shape_fn((80, 2), |(i, j)| if j == 0 { 1.0 } else { (i % 4) as f64 - 1.5 })
    }

    #[test]
    fn test_beta_per_dimension() {
        let f = features();
        let true_beta = array![[1.0, -0.5], [0.5, 2.0]];
        let u = f.dot(&true_beta).reversed_axes();
        let mut model = Model::from_factors(vec![u]).unwrap();
        let mut rng = SamplerRng::seed_from(21);
        let mut prior = MacauOnePrior::new(0, 2, SideInfo::dense(f).with_lambda_beta(1e-3));
        prior.init(&mut model, &mut rng).unwrap();
        prior.lambda = Array1::from_elem(2, 1e4);
        let beta = prior.sample_beta(&model, &mut rng).unwrap();
        for (a, b) in beta.iter().zip(true_beta.iter()) {
            assert!((a - b).abs() < 0.05, "{:?}", beta);
        }
    }

    #[test]
    fn test_hyper_sweep_and_restore() {
        let f = features();
        let mut rng = SamplerRng::seed_from(5);
        let u = Array2::from_shape_fn((3, 80), |(d, e)| (d as f64) - 1.0 + 0.1 * ((e % 7) as f64));
        let mut model = Model::from_factors(vec![u]).unwrap();
        let si = SideInfo::dense(f).with_lambda_beta_sampling(true);
        let mut prior = MacauOnePrior::new(0, 3, si.clone());
        prior.init(&mut model, &mut rng).unwrap();
        prior.sample_hyper(&mut model, &mut rng).unwrap();
        assert!(prior.precision().iter().all(|&l| l > 0.0));
        assert!(prior.lambda_beta().iter().all(|&l| l > 0.0));
        assert_eq!(model.link_matrix(0).unwrap().beta.dim(), (2, 3));

        let mut restored = MacauOnePrior::new(0, 3, si);
        restored.restore(&prior.save(), &model).unwrap();
        assert_eq!(restored.uhat, prior.uhat);
        assert_eq!(restored.lambda_beta(), prior.lambda_beta());
    }
}
