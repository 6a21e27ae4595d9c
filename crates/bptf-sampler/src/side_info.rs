//! Per-mode side information for the Macau priors
//!
//! A feature matrix `F` has one row per entity of the mode and one column
//! per feature. The Macau priors regress latent vectors on these rows,
//! `u_e ≈ μ + βᵀ f_e`, and resample `β` every sweep by solving the ridge
//! system
//!
//! ```text
//! (FᵀF + λβ I) β = R
//! ```
//!
//! either directly (Cholesky of the F × F Gram matrix) or iteratively with
//! Jacobi-preconditioned CG, which only needs products with `F` and `Fᵀ`.

use bptf_core::linalg::{cholesky_lower, chol_solve_matrix};
use bptf_core::{BptfError, BptfResult};
use bptf_sparse::{cg, CsrMatrix, JacobiPreconditioner, LinearOperator, SparseResult};
use scirs2_core::ndarray_ext::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default ridge precision on the link matrix
pub const DEFAULT_LAMBDA_BETA: f64 = 10.0;
/// Default relative tolerance of the iterative solver
pub const DEFAULT_TOLERANCE: f64 = 1e-6;
/// Iteration cap of the iterative solver
pub const DEFAULT_MAX_ITER: usize = 1000;

/// How the ridge system for `β` is solved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveMode {
    /// Cholesky of `FᵀF + λI`
    #[default]
    Direct,
    /// Conjugate gradient without forming `FᵀF`
    Iterative,
}

/// Dense or sparse entity × feature matrix
#[derive(Debug, Clone)]
pub enum FeatureMatrix {
    Dense(Array2<f64>),
    Sparse(CsrMatrix<f64>),
}

impl FeatureMatrix {
    pub fn nrows(&self) -> usize {
        match self {
            Self::Dense(f) => f.nrows(),
            Self::Sparse(f) => f.nrows(),
        }
    }

    pub fn ncols(&self) -> usize {
        match self {
            Self::Dense(f) => f.ncols(),
            Self::Sparse(f) => f.ncols(),
        }
    }

    /// `F β` (N × D)
    pub fn mul(&self, beta: &ArrayView2<f64>) -> BptfResult<Array2<f64>> {
        match self {
            Self::Dense(f) => Ok(f.dot(beta)),
            Self::Sparse(f) => Ok(f.spmm(beta).map_err(bptf_sparse::SparseError::from)?),
        }
    }

    /// `Fᵀ X` (F × D) for an N × D matrix `X`
    pub fn t_mul(&self, x: &ArrayView2<f64>) -> BptfResult<Array2<f64>> {
        match self {
            Self::Dense(f) => Ok(f.t().dot(x)),
            Self::Sparse(f) => Ok(f
                .spmm_transpose(x)
                .map_err(bptf_sparse::SparseError::from)?),
        }
    }

    /// `FᵀF`
    pub fn gram(&self) -> Array2<f64> {
        match self {
            Self::Dense(f) => f.t().dot(f),
            Self::Sparse(f) => f.gram(),
        }
    }

    /// Squared column norms (diagonal of `FᵀF`)
    pub fn column_sq_norms(&self) -> Vec<f64> {
        match self {
            Self::Dense(f) => f.columns().into_iter().map(|c| c.dot(&c)).collect(),
            Self::Sparse(f) => f.column_sq_norms(),
        }
    }

    fn gram_apply(&self, x: &[f64]) -> SparseResult<Vec<f64>> {
        let xv = ArrayView1::from(x);
        match self {
            Self::Dense(f) => {
                let fx = f.dot(&xv);
                Ok(f.t().dot(&fx).to_vec())
            }
            Self::Sparse(f) => {
                let fx = f.spmv(&xv)?;
                Ok(f.spmv_transpose(&fx.view())?.to_vec())
            }
        }
    }
}

/// `FᵀF + λI` as a matrix-free operator
struct RidgeOperator<'a> {
    features: &'a FeatureMatrix,
    lambda: f64,
}

impl LinearOperator<f64> for RidgeOperator<'_> {
    fn dim(&self) -> usize {
        self.features.ncols()
    }

    fn apply(&self, x: &[f64]) -> SparseResult<Vec<f64>> {
        let mut y = self.features.gram_apply(x)?;
        for (yi, xi) in y.iter_mut().zip(x.iter()) {
            *yi += self.lambda * xi;
        }
        Ok(y)
    }
}

/// Side information attached to one mode
#[derive(Debug, Clone)]
pub struct SideInfo {
    features: FeatureMatrix,
    lambda_beta: f64,
    solve_mode: SolveMode,
    tolerance: f64,
    max_iter: usize,
    sample_lambda_beta: bool,
}

impl SideInfo {
    pub fn new(features: FeatureMatrix) -> Self {
        Self {
            features,
            lambda_beta: DEFAULT_LAMBDA_BETA,
            solve_mode: SolveMode::Direct,
            tolerance: DEFAULT_TOLERANCE,
            max_iter: DEFAULT_MAX_ITER,
            sample_lambda_beta: false,
        }
    }

    pub fn dense(features: Array2<f64>) -> Self {
        Self::new(FeatureMatrix::Dense(features))
    }

    /// Sparse features default to the iterative solver
    pub fn sparse(features: CsrMatrix<f64>) -> Self {
        Self::new(FeatureMatrix::Sparse(features)).with_solve_mode(SolveMode::Iterative)
    }

    pub fn with_lambda_beta(mut self, lambda_beta: f64) -> Self {
        self.lambda_beta = lambda_beta;
        self
    }

    pub fn with_solve_mode(mut self, mode: SolveMode) -> Self {
        self.solve_mode = mode;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Resample `λβ` from its Gamma posterior every sweep
    pub fn with_lambda_beta_sampling(mut self, enabled: bool) -> Self {
        self.sample_lambda_beta = enabled;
        self
    }

    pub fn features(&self) -> &FeatureMatrix {
        &self.features
    }

    pub fn num_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn row_count(&self) -> usize {
        self.features.nrows()
    }

    pub fn lambda_beta(&self) -> f64 {
        self.lambda_beta
    }

    pub fn solve_mode(&self) -> SolveMode {
        self.solve_mode
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn samples_lambda_beta(&self) -> bool {
        self.sample_lambda_beta
    }

    /// Check the side information against the size of its mode
    ///
    /// # Errors
    ///
    /// [`BptfError::Configuration`] on a row-count mismatch or invalid
    /// regularization settings.
    pub fn validate(&self, mode: usize, mode_size: usize) -> BptfResult<()> {
        if self.row_count() != mode_size {
            return Err(BptfError::configuration(format!(
                "side info for mode {} has {} rows but the mode has {} entities",
                mode,
                self.row_count(),
                mode_size
            )));
        }
        if !(self.lambda_beta.is_finite() && self.lambda_beta > 0.0) {
            return Err(BptfError::configuration(format!(
                "lambda_beta must be positive, got {}",
                self.lambda_beta
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) || self.max_iter == 0 {
            return Err(BptfError::configuration(
                "iterative solver needs a positive tolerance and iteration cap",
            ));
        }
        Ok(())
    }

    /// Solve `(FᵀF + λ I) X = rhs` for an F × D right-hand side
    ///
    /// `warm` seeds the iterative solver (typically the previous `β`).
    pub fn solve_ridge(
        &self,
        rhs: &ArrayView2<f64>,
        lambda: f64,
        warm: Option<&ArrayView2<f64>>,
    ) -> BptfResult<Array2<f64>> {
        match self.solve_mode {
            SolveMode::Direct => {
                let mut a = self.features.gram();
                for i in 0..a.nrows() {
                    a[[i, i]] += lambda;
                }
                let l = cholesky_lower(&a.view())?;
                chol_solve_matrix(&l.view(), rhs)
            }
            SolveMode::Iterative => {
                let op = RidgeOperator {
                    features: &self.features,
                    lambda,
                };
                let diag: Vec<f64> = self
                    .features
                    .column_sq_norms()
                    .iter()
                    .map(|d| d + lambda)
                    .collect();
                let jacobi = JacobiPreconditioner::from_diagonal(&diag)?;
                let mut out = Array2::<f64>::zeros(rhs.dim());
                for (j, col) in rhs.columns().into_iter().enumerate() {
                    let b = col.to_vec();
                    let x0 = warm.map(|w| w.column(j).to_vec());
                    let (x, info) =
                        cg(&op, &b, x0.as_deref(), self.max_iter, self.tolerance, Some(&jacobi))?;
                    if !info.converged {
                        warn!(column = j, %info, "ridge CG did not reach tolerance");
                    }
                    out.column_mut(j).assign(&Array1::from_vec(x));
                }
                Ok(out)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray_ext::array;

    fn dense_features() -> Array2<f64> {
        array![
            [1.0, 0.0, 2.0],
            [0.0, 1.0, 0.0],
            [3.0, 0.0, 1.0],
            [0.0, 2.0, 1.0]
        ]
    }

    #[test]
    fn test_validate_row_mismatch() {
        let si = SideInfo::dense(dense_features());
        assert!(si.validate(0, 4).is_ok());
        assert!(si.validate(0, 5).unwrap_err().is_configuration());
        let bad = SideInfo::dense(dense_features()).with_lambda_beta(0.0);
        assert!(bad.validate(0, 4).unwrap_err().is_configuration());
    }

    #[test]
    fn test_dense_and_sparse_products_agree() {
        let dense = FeatureMatrix::Dense(dense_features());
        let sparse =
            FeatureMatrix::Sparse(CsrMatrix::from_dense(&dense_features().view(), 0.0).unwrap());
        let beta = array![[1.0, -1.0], [0.5, 2.0], [0.0, 1.0]];
        let x = array![[1.0, 0.0], [2.0, 1.0], [0.0, 1.0], [1.0, 1.0]];

        assert_eq!(dense.mul(&beta.view()).unwrap(), sparse.mul(&beta.view()).unwrap());
        assert_eq!(dense.t_mul(&x.view()).unwrap(), sparse.t_mul(&x.view()).unwrap());
        assert_eq!(dense.gram(), sparse.gram());
        assert_eq!(dense.column_sq_norms(), sparse.column_sq_norms());
    }

    #[test]
    fn test_iterative_matches_direct() {
        let rhs = array![[1.0, 2.0], [-1.0, 0.5], [0.0, 3.0]];
        let direct = SideInfo::dense(dense_features());
        let iterative = SideInfo::sparse(
            CsrMatrix::from_dense(&dense_features().view(), 0.0).unwrap(),
        )
        .with_tolerance(1e-12);

        let a = direct.solve_ridge(&rhs.view(), 2.0, None).unwrap();
        let b = iterative.solve_ridge(&rhs.view(), 2.0, None).unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-8, "{} vs {}", x, y);
        }

        // Warm start from the answer
        let c = iterative.solve_ridge(&rhs.view(), 2.0, Some(&a.view())).unwrap();
        for (x, y) in a.iter().zip(c.iter()) {
            assert!((x - y).abs() < 1e-8);
        }
    }
}
