//! Macau prior: Normal prior whose mean is regressed on side information
//!
//! Entity `e` has prior mean `μ + βᵀ f_e`. After the entity phase, `β` is
//! drawn jointly from its Gaussian conditional by a noisy ridge regression
//!
//! ```text
//! (FᵀF + λβ I) β = Fᵀ(Uᵀ − 1μᵀ + E₁) + √λβ · E₂,    rows of E ~ N(0, Λ⁻¹)
//! ```
//!
//! then `(μ, Λ)` are redrawn on the residual `U − βᵀFᵀ`, with the link
//! matrix folded into the Wishart prior (`T₀⁻¹ + λβ βᵀβ`, `ν₀ + F`).
//!
//! The current `β` and `μ` live in the model's link matrix for this mode.

use super::normal::{mu_lambda_status, restore_mu_lambda};
use super::{
    mismatched_state, sample_gaussian_canonical, sample_rows_with_precision, PriorState,
    SamplePrior,
};
use crate::block::EntityStats;
use crate::conjugate::{sample_cond_normal_wishart, NormalWishartPrior, SufficientStats};
use crate::model::{MatrixRecord, Model};
use crate::side_info::SideInfo;
use bptf_core::linalg::cholesky_lower;
use bptf_core::{BptfError, BptfResult, SamplerRng};
use scirs2_core::ndarray_ext::{Array1, Array2};
use tracing::debug;

/// Gamma hyperprior on `λβ`: mean and shape-like weight
const LAMBDA_BETA_MU0: f64 = 1.0;
const LAMBDA_BETA_NU0: f64 = 1e-3;

#[derive(Debug, Clone)]
pub struct MacauPrior {
    mode: usize,
    mu: Array1<f64>,
    lambda: Array2<f64>,
    hyper: NormalWishartPrior,
    side_info: SideInfo,
    lambda_beta: f64,
    /// `βᵀFᵀ`, D × N
    uhat: Array2<f64>,
}

impl MacauPrior {
    pub fn new(mode: usize, num_latent: usize, side_info: SideInfo) -> Self {
        let lambda_beta = side_info.lambda_beta();
        let n = side_info.row_count();
        Self {
            mode,
            mu: Array1::zeros(num_latent),
            lambda: Array2::eye(num_latent),
            hyper: NormalWishartPrior::standard(num_latent),
            side_info,
            lambda_beta,
            uhat: Array2::zeros((num_latent, n)),
        }
    }

    pub fn lambda_beta(&self) -> f64 {
        self.lambda_beta
    }

    pub fn mu(&self) -> &Array1<f64> {
        &self.mu
    }

    fn link_beta(&self, model: &Model) -> BptfResult<Array2<f64>> {
        model
            .link_matrix(self.mode)
            .map(|l| l.beta.clone())
            .ok_or_else(|| {
                BptfError::invalid_state(format!(
                    "mode {} has no link matrix; the prior was not initialized",
                    self.mode
                ))
            })
    }

    fn sample_beta(&self, model: &Model, rng: &mut SamplerRng) -> BptfResult<Array2<f64>> {
        let u = model.factor(self.mode);
        let n = u.ncols();
        let nfeat = self.side_info.num_features();
        let lambda_chol = cholesky_lower(&self.lambda.view())?;

        let mut target = u.t().to_owned();
        target -= &self.mu;
        target += &sample_rows_with_precision(n, &lambda_chol.view(), rng)?;
        let mut rhs = self.side_info.features().t_mul(&target.view())?;
        rhs.scaled_add(
            self.lambda_beta.sqrt(),
            &sample_rows_with_precision(nfeat, &lambda_chol.view(), rng)?,
        );

        let warm = self.link_beta(model)?;
        self.side_info
            .solve_ridge(&rhs.view(), self.lambda_beta, Some(&warm.view()))
    }

    fn sample_lambda_beta(&self, beta: &Array2<f64>, rng: &mut SamplerRng) -> BptfResult<f64> {
        let btb = beta.t().dot(beta);
        let weighted = (&btb * &self.lambda).sum();
        let nux = LAMBDA_BETA_NU0 + beta.len() as f64;
        let mux = LAMBDA_BETA_MU0 * nux / (LAMBDA_BETA_NU0 + LAMBDA_BETA_MU0 * weighted);
        rng.gamma(0.5 * nux, 2.0 * mux / nux)
    }
}

impl SamplePrior for MacauPrior {
    fn mode(&self) -> usize {
        self.mode
    }

    fn name(&self) -> &'static str {
        "Macau"
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
        _model: &Model,
        stats: &EntityStats,
        rng: &mut SamplerRng,
    ) -> BptfResult<Array1<f64>> {
        let precision = &self.lambda + &stats.precision;
        let mean = &self.mu + &self.uhat.column(entity);
        let h = self.lambda.dot(&mean) + &stats.rhs;
        sample_gaussian_canonical(&precision.view(), &h.view(), rng)
    }

    fn sample_hyper(&mut self, model: &mut Model, rng: &mut SamplerRng) -> BptfResult<()> {
        let beta = self.sample_beta(model, rng)?;
        self.uhat = self.side_info.features().mul(&beta.view())?.reversed_axes();

        let delta = model.factor(self.mode) - &self.uhat;
        let stats = SufficientStats::from_columns(&delta.view());
        let btb = beta.t().dot(&beta);
        let hyper = NormalWishartPrior::from_inverse_scale(
            self.hyper.mu0.clone(),
            self.hyper.kappa0,
            &self.hyper.scale_inv + &(btb * self.lambda_beta),
            self.hyper.nu0 + self.side_info.num_features() as f64,
        )?;
        let (mu, lambda) = sample_cond_normal_wishart(&stats, &hyper, rng)?;
        self.mu = mu;
        self.lambda = lambda;

        if self.side_info.samples_lambda_beta() {
            self.lambda_beta = self.sample_lambda_beta(&beta, rng)?;
            debug!(mode = self.mode, lambda_beta = self.lambda_beta, "lambda_beta resampled");
        }
        model.set_link_matrix(self.mode, beta, self.mu.clone());
        Ok(())
    }

    fn status(&self) -> String {
        format!(
            "Macau [mode {}]: {}, lambda_beta = {:.4}",
            self.mode,
            mu_lambda_status(&self.mu, &self.lambda),
            self.lambda_beta
        )
    }

    fn save(&self) -> PriorState {
        PriorState::Macau {
            mu: self.mu.to_vec(),
            lambda: MatrixRecord::from_array(&self.lambda),
            lambda_beta: self.lambda_beta,
        }
    }

    fn restore(&mut self, state: &PriorState, model: &Model) -> BptfResult<()> {
        let PriorState::Macau {
            mu,
            lambda,
            lambda_beta,
        } = state
        else {
            return Err(mismatched_state("macau", state));
        };
        let beta = self.link_beta(model)?;
        if beta.dim() != (self.side_info.num_features(), self.mu.len()) {
            return Err(BptfError::configuration(format!(
                "saved link matrix for mode {} is {:?}, expected {}x{}",
                self.mode,
                beta.dim(),
                self.side_info.num_features(),
                self.mu.len()
            )));
        }
        (self.mu, self.lambda) = restore_mu_lambda(mu, lambda, self.mu.len())?;
        self.lambda_beta = *lambda_beta;
        self.uhat = self.side_info.features().mul(&beta.view())?.reversed_axes();
        Ok(())
    }
}
