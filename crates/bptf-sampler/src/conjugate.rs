//! Conjugate Wishart / Normal-Wishart / Normal-Gamma draws
//!
//! # Parameterization
//!
//! `Wishart(T, ν)` has scale matrix `T` and mean `ν T`. A Normal-Wishart
//! draw returns `(μ, Λ)` with `Λ ~ Wishart(T, ν)` and `μ ~ N(μ₀, (κΛ)⁻¹)`.
//!
//! The hyperprior ([`NormalWishartPrior`]) keeps both `T₀` and `T₀⁻¹`: the
//! posterior update needs the inverse scale, and an update with no data must
//! hand back the prior exactly.
//!
//! # Algorithm
//!
//! - `wishart_unit`: Bartlett decomposition
//! - `wishart`: `A = L · W · Lᵀ` with `T = L Lᵀ`
//! - `cond_normal_wishart`: closed-form posterior from sufficient statistics
//!   (count, `Σ x xᵀ`, `Σ x`), accumulated incrementally

use bptf_core::linalg::{add_outer, cholesky_lower, inverse_spd, outer, solve_lower_transpose};
use bptf_core::{BptfError, BptfResult, SamplerRng};
use scirs2_core::ndarray_ext::{Array1, Array2, ArrayView1, ArrayView2};

/// Parameters of a Normal-Wishart distribution
#[derive(Debug, Clone, PartialEq)]
pub struct NormalWishartParams {
    pub mu: Array1<f64>,
    pub kappa: f64,
    /// Wishart scale `T`
    pub scale: Array2<f64>,
    pub nu: f64,
}

/// Normal-Wishart hyperprior over a mode's shared mean and precision
#[derive(Debug, Clone, PartialEq)]
pub struct NormalWishartPrior {
    pub mu0: Array1<f64>,
    pub kappa0: f64,
    /// Wishart scale `T₀`
    pub scale: Array2<f64>,
    /// `T₀⁻¹`
    pub scale_inv: Array2<f64>,
    pub nu0: f64,
}

impl NormalWishartPrior {
    /// Build a hyperprior from its scale matrix
    pub fn new(mu0: Array1<f64>, kappa0: f64, scale: Array2<f64>, nu0: f64) -> BptfResult<Self> {
        let d = mu0.len();
        if scale.dim() != (d, d) {
            return Err(BptfError::configuration(format!(
                "Normal-Wishart scale must be {}x{}, got {:?}",
                d,
                d,
                scale.dim()
            )));
        }
        if kappa0 <= 0.0 || nu0 <= (d as f64) - 1.0 {
            return Err(BptfError::configuration(format!(
                "Normal-Wishart needs kappa0 > 0 and nu0 > D - 1 (kappa0 = {}, nu0 = {}, D = {})",
                kappa0, nu0, d
            )));
        }
        let scale_inv = inverse_spd(&scale.view())?;
        Ok(Self {
            mu0,
            kappa0,
            scale,
            scale_inv,
            nu0,
        })
    }

    /// Build a hyperprior from its inverse scale `T₀⁻¹`
    pub fn from_inverse_scale(
        mu0: Array1<f64>,
        kappa0: f64,
        scale_inv: Array2<f64>,
        nu0: f64,
    ) -> BptfResult<Self> {
        let scale = inverse_spd(&scale_inv.view())?;
        let mut prior = Self::new(mu0, kappa0, scale, nu0)?;
        prior.scale_inv = scale_inv;
        Ok(prior)
    }

    /// Default hyperprior for `d` latent dimensions: `μ₀ = 0`, `κ₀ = 2`,
    /// `T₀ = I`, `ν₀ = d`
    pub fn standard(d: usize) -> Self {
        Self {
            mu0: Array1::zeros(d),
            kappa0: 2.0,
            scale: Array2::eye(d),
            scale_inv: Array2::eye(d),
            nu0: d as f64,
        }
    }

    /// The prior itself as draw parameters
    pub fn params(&self) -> NormalWishartParams {
        NormalWishartParams {
            mu: self.mu0.clone(),
            kappa: self.kappa0,
            scale: self.scale.clone(),
            nu: self.nu0,
        }
    }

    pub fn dim(&self) -> usize {
        self.mu0.len()
    }
}

/// Sufficient statistics of a set of D-dimensional vectors
#[derive(Debug, Clone, PartialEq)]
pub struct SufficientStats {
    pub n: usize,
    /// `Σ x xᵀ`
    pub sum_outer: Array2<f64>,
    /// `Σ x`
    pub sum_vec: Array1<f64>,
}

impl SufficientStats {
    pub fn new(d: usize) -> Self {
        Self {
            n: 0,
            sum_outer: Array2::zeros((d, d)),
            sum_vec: Array1::zeros(d),
        }
    }

    /// Statistics of the columns of a D × N matrix
    pub fn from_columns(columns: &ArrayView2<f64>) -> Self {
        Self {
            n: columns.ncols(),
            sum_outer: columns.dot(&columns.t()),
            sum_vec: columns.sum_axis(scirs2_core::ndarray_ext::Axis(1)),
        }
    }

    pub fn push(&mut self, x: &ArrayView1<f64>) {
        self.n += 1;
        add_outer(&mut self.sum_outer, x, 1.0);
        self.sum_vec += x;
    }

    /// Combine partial statistics, e.g. from different workers
    pub fn merge(&mut self, other: &SufficientStats) {
        self.n += other.n;
        self.sum_outer += &other.sum_outer;
        self.sum_vec += &other.sum_vec;
    }

    pub fn dim(&self) -> usize {
        self.sum_vec.len()
    }
}

/// Draw from the unit Wishart `Wishart(I, df)` via the Bartlett decomposition
///
/// Diagonal of the upper factor `C` is `sqrt(χ²(df - i))`, the strict upper
/// triangle is standard normal; returns `CᵀC`.
pub fn wishart_unit(size: usize, df: f64, rng: &mut SamplerRng) -> BptfResult<Array2<f64>> {
    let mut c = Array2::<f64>::zeros((size, size));
    for i in 0..size {
        c[[i, i]] = (2.0 * rng.gamma(0.5 * (df - i as f64), 1.0)?).sqrt();
        for j in (i + 1)..size {
            c[[i, j]] = rng.normal();
        }
    }
    Ok(c.t().dot(&c))
}

/// Draw from `Wishart(sigma, df)`
pub fn wishart(sigma: &ArrayView2<f64>, df: f64, rng: &mut SamplerRng) -> BptfResult<Array2<f64>> {
    let size = sigma.nrows();
    if df <= size as f64 - 1.0 {
        return Err(BptfError::numerical(format!(
            "Wishart degrees of freedom {} too small for dimension {}",
            df, size
        )));
    }
    let l = cholesky_lower(sigma)?;
    let unit = wishart_unit(size, df, rng)?;
    let mut a = l.dot(&unit).dot(&l.t());
    bptf_core::linalg::symmetrize(&mut a);
    Ok(a)
}

/// Draw `x ~ N(mean, precision⁻¹)` without inverting the precision
pub fn mvnormal_prec(
    precision: &ArrayView2<f64>,
    mean: &ArrayView1<f64>,
    rng: &mut SamplerRng,
) -> BptfResult<Array1<f64>> {
    let l = cholesky_lower(precision)?;
    let z = rng.normal_vec(mean.len());
    let x = solve_lower_transpose(&l.view(), &z.view())?;
    Ok(x + mean)
}

/// Draw a (mean, precision) pair from a Normal-Wishart
pub fn normal_wishart(
    params: &NormalWishartParams,
    rng: &mut SamplerRng,
) -> BptfResult<(Array1<f64>, Array2<f64>)> {
    let lambda = wishart(&params.scale.view(), params.nu, rng)?;
    let scaled = &lambda * params.kappa;
    let mu = mvnormal_prec(&scaled.view(), &params.mu.view(), rng)?;
    Ok((mu, lambda))
}

/// Posterior Normal-Wishart parameters given sufficient statistics
///
/// With `stats.n == 0` the prior is returned unchanged.
///
/// # Errors
///
/// [`BptfError::Numerical`] if the posterior inverse scale is not
/// positive-definite.
pub fn cond_normal_wishart(
    stats: &SufficientStats,
    prior: &NormalWishartPrior,
) -> BptfResult<NormalWishartParams> {
    if stats.dim() != prior.dim() {
        return Err(BptfError::numerical(format!(
            "sufficient statistics of dimension {} for a prior of dimension {}",
            stats.dim(),
            prior.dim()
        )));
    }
    if stats.n == 0 {
        return Ok(prior.params());
    }

    let n = stats.n as f64;
    let kappa_c = prior.kappa0 + n;
    let nu_c = prior.nu0 + n;
    let mu_c = (&prior.mu0 * prior.kappa0 + &stats.sum_vec) / kappa_c;

    let scale_inv_c = &prior.scale_inv + &stats.sum_outer
        + outer(&prior.mu0.view(), &prior.mu0.view()) * prior.kappa0
        - outer(&mu_c.view(), &mu_c.view()) * kappa_c;
    let scale_c = inverse_spd(&scale_inv_c.view())?;

    Ok(NormalWishartParams {
        mu: mu_c,
        kappa: kappa_c,
        scale: scale_c,
        nu: nu_c,
    })
}

/// Posterior update followed by a Normal-Wishart draw
pub fn sample_cond_normal_wishart(
    stats: &SufficientStats,
    prior: &NormalWishartPrior,
    rng: &mut SamplerRng,
) -> BptfResult<(Array1<f64>, Array2<f64>)> {
    let params = cond_normal_wishart(stats, prior)?;
    normal_wishart(&params, rng)
}

/// Scalar Normal-Gamma hyperprior: `λ ~ Gamma(a₀, rate b₀)`,
/// `μ | λ ~ N(μ₀, (κ₀λ)⁻¹)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalGammaPrior {
    pub mu0: f64,
    pub kappa0: f64,
    pub a0: f64,
    pub b0: f64,
}

impl Default for NormalGammaPrior {
    fn default() -> Self {
        Self {
            mu0: 0.0,
            kappa0: 2.0,
            a0: 1.0,
            b0: 1.0,
        }
    }
}

/// Draw `(μ, λ)` from the Normal-Gamma posterior of `n` scalars with the
/// given sum and sum of squares
pub fn sample_normal_gamma(
    n: usize,
    sum: f64,
    sumsq: f64,
    prior: &NormalGammaPrior,
    rng: &mut SamplerRng,
) -> BptfResult<(f64, f64)> {
    let nf = n as f64;
    let kappa_n = prior.kappa0 + nf;
    let mu_n = (prior.kappa0 * prior.mu0 + sum) / kappa_n;
    let a_n = prior.a0 + 0.5 * nf;
    let b_n = prior.b0
        + 0.5 * (sumsq + prior.kappa0 * prior.mu0 * prior.mu0 - kappa_n * mu_n * mu_n).max(0.0);
    let lambda = rng.gamma_rate(a_n, b_n)?;
    let mu = mu_n + rng.normal() / (kappa_n * lambda).sqrt();
    Ok((mu, lambda))
}
