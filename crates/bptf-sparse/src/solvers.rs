//! Preconditioned conjugate gradient for symmetric positive-definite systems
//!
//! The side-information prior solves ridge systems `(FᵀF + λI) x = b` where
//! `F` can have millions of rows. Forming `FᵀF` is avoided by passing an
//! implicit [`LinearOperator`].
//!
//! # Examples
//!
//! ```rust
//! use bptf_sparse::solvers::{cg, JacobiPreconditioner, LinearOperator};
//! use bptf_sparse::SparseResult;
//!
//! // A = [[2, -1], [-1, 2]]
//! struct Tridiagonal;
//!
//! impl LinearOperator<f64> for Tridiagonal {
//!     fn dim(&self) -> usize {
//!         2
//!     }
//!
//!     fn apply(&self, x: &[f64]) -> SparseResult<Vec<f64>> {
//!         Ok(vec![2.0 * x[0] - x[1], 2.0 * x[1] - x[0]])
//!     }
//! }
//!
//! let (x, info) = cg::<f64, _, JacobiPreconditioner<f64>>(&Tridiagonal, &[1.0, 1.0], None, 100, 1e-10, None).unwrap();
//! assert!(info.converged);
//! assert!((x[0] - 1.0).abs() < 1e-8);
//! ```

use crate::{SparseError, SparseResult};
use scirs2_core::numeric::Float;
use std::fmt;

/// Solver convergence information
#[derive(Debug, Clone)]
pub struct SolverInfo {
    /// Number of iterations performed
    pub iterations: usize,
    /// Final relative residual norm
    pub residual: f64,
    /// Whether the solver converged
    pub converged: bool,
}

impl fmt::Display for SolverInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Solver: {} in {} iterations, residual = {:.2e}",
            if self.converged {
                "converged"
            } else {
                "did not converge"
            },
            self.iterations,
            self.residual
        )
    }
}

/// A square linear map applied matrix-free
pub trait LinearOperator<T: Float> {
    /// Dimension of the (square) operator
    fn dim(&self) -> usize;

    /// Compute `A x`
    fn apply(&self, x: &[T]) -> SparseResult<Vec<T>>;
}

/// Preconditioner trait for iterative solvers
///
/// Passing `None` to [`cg`] runs it unpreconditioned.
pub trait Preconditioner<T: Float> {
    /// Apply preconditioner: solve M*z = r for z
    fn apply(&self, r: &[T]) -> SparseResult<Vec<T>>;
}

/// Jacobi (diagonal) preconditioner
///
/// Uses M = diag(A). For ridge systems the diagonal is the squared column
/// norms of `F` plus `λ`, which is known without forming `FᵀF`.
///
/// # Examples
///
/// ```rust
/// use bptf_sparse::solvers::{JacobiPreconditioner, Preconditioner};
///
/// let precond = JacobiPreconditioner::from_diagonal(&[4.0, 2.0]).unwrap();
/// let z = precond.apply(&[1.0, 1.0]).unwrap();
/// assert!((z[0] - 0.25_f64).abs() < 1e-12);
/// ```
pub struct JacobiPreconditioner<T: Float> {
    diag_inv: Vec<T>,
}

impl<T: Float> JacobiPreconditioner<T> {
    /// Create Jacobi preconditioner from an explicit diagonal
    pub fn from_diagonal(diag: &[T]) -> SparseResult<Self> {
        let mut diag_inv = Vec::with_capacity(diag.len());
        for (i, &d) in diag.iter().enumerate() {
            if d.abs() < T::epsilon() {
                return Err(SparseError::operation(&format!(
                    "Zero diagonal element at index {}",
                    i
                )));
            }
            diag_inv.push(T::one() / d);
        }
        Ok(Self { diag_inv })
    }
}

impl<T: Float> Preconditioner<T> for JacobiPreconditioner<T> {
    fn apply(&self, r: &[T]) -> SparseResult<Vec<T>> {
        if r.len() != self.diag_inv.len() {
            return Err(SparseError::validation("preconditioner size mismatch"));
        }
        Ok(r.iter()
            .zip(self.diag_inv.iter())
            .map(|(ri, di)| *ri * *di)
            .collect())
    }
}

/// Conjugate Gradient solver for SPD systems
///
/// Solves `A x = b` starting from `x0` (zero if `None`). Converges when
/// `‖r‖ ≤ tol · ‖b‖`.
///
/// # Errors
///
/// - dimension mismatches
/// - breakdown (`pᵀAp ≤ 0`), which means `A` is not positive-definite
pub fn cg<T, A, P>(
    a: &A,
    b: &[T],
    x0: Option<&[T]>,
    max_iter: usize,
    tol: f64,
    precond: Option<&P>,
) -> SparseResult<(Vec<T>, SolverInfo)>
where
    T: Float,
    A: LinearOperator<T> + ?Sized,
    P: Preconditioner<T>,
{
    let n = a.dim();
    if b.len() != n {
        return Err(SparseError::validation(&format!(
            "RHS size {} != operator size {}",
            b.len(),
            n
        )));
    }

    let b_norm = norm_squared(b).to_f64().unwrap_or(0.0).sqrt();
    if b_norm == 0.0 {
        return Ok((
            vec![T::zero(); n],
            SolverInfo {
                iterations: 0,
                residual: 0.0,
                converged: true,
            },
        ));
    }

    let mut x = match x0 {
        Some(guess) if guess.len() == n => guess.to_vec(),
        Some(guess) => {
            return Err(SparseError::validation(&format!(
                "initial guess size {} != operator size {}",
                guess.len(),
                n
            )))
        }
        None => vec![T::zero(); n],
    };

    // r = b - A*x
    let ax = a.apply(&x)?;
    let mut r: Vec<T> = b.iter().zip(ax.iter()).map(|(bi, ai)| *bi - *ai).collect();

    let threshold = tol * b_norm;
    if l2_norm(&r) <= threshold {
        return Ok((
            x,
            SolverInfo {
                iterations: 0,
                residual: l2_norm(&r) / b_norm,
                converged: true,
            },
        ));
    }

    let mut z = match precond {
        Some(p) => p.apply(&r)?,
        None => r.clone(),
    };
    let mut p = z.clone();
    let mut rz = dot(&r, &z);

    for iter in 0..max_iter {
        let q = a.apply(&p)?;

        let pq = dot(&p, &q);
        if pq <= T::zero() {
            return Err(SparseError::operation(
                "CG breakdown: operator is not positive definite",
            ));
        }
        let alpha = rz / pq;

        axpy(alpha, &p, &mut x);
        axpy(-alpha, &q, &mut r);

        let r_norm = l2_norm(&r);
        if r_norm <= threshold {
            return Ok((
                x,
                SolverInfo {
                    iterations: iter + 1,
                    residual: r_norm / b_norm,
                    converged: true,
                },
            ));
        }

        z = match precond {
            Some(p) => p.apply(&r)?,
            None => r.clone(),
        };

        let rz_new = dot(&r, &z);
        let beta = rz_new / rz;
        for (pi, zi) in p.iter_mut().zip(z.iter()) {
            *pi = *zi + beta * *pi;
        }
        rz = rz_new;
    }

    let r_norm = l2_norm(&r);
    Ok((
        x,
        SolverInfo {
            iterations: max_iter,
            residual: r_norm / b_norm,
            converged: false,
        },
    ))
}

fn dot<T: Float>(a: &[T], b: &[T]) -> T {
    a.iter()
        .zip(b.iter())
        .fold(T::zero(), |acc, (x, y)| acc + *x * *y)
}

fn norm_squared<T: Float>(a: &[T]) -> T {
    dot(a, a)
}

fn l2_norm<T: Float>(a: &[T]) -> f64 {
    norm_squared(a).to_f64().unwrap_or(f64::INFINITY).sqrt()
}

fn axpy<T: Float>(alpha: T, x: &[T], y: &mut [T]) {
    for (yi, xi) in y.iter_mut().zip(x.iter()) {
        *yi = *yi + alpha * *xi;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CsrMatrix;
    use scirs2_core::ndarray_ext::Array1;

    type Plain = JacobiPreconditioner<f64>;

    /// Square CSR matrix used as an operator
    struct Square(CsrMatrix<f64>);

    impl LinearOperator<f64> for Square {
        fn dim(&self) -> usize {
            self.0.nrows()
        }

        fn apply(&self, x: &[f64]) -> SparseResult<Vec<f64>> {
            let xv = Array1::from_vec(x.to_vec());
            Ok(self.0.spmv(&xv.view())?.to_vec())
        }
    }

    fn laplacian(n: usize) -> Square {
        let mut triplets = Vec::new();
        for i in 0..n {
            triplets.push((i, i, 2.5));
            if i > 0 {
                triplets.push((i, i - 1, -1.0));
            }
            if i + 1 < n {
                triplets.push((i, i + 1, -1.0));
            }
        }
        Square(CsrMatrix::from_triplets((n, n), &triplets).unwrap())
    }

    #[test]
    fn test_cg_unpreconditioned() {
        let a = laplacian(20);
        let b: Vec<f64> = (0..20).map(|i| (i as f64).sin()).collect();
        let (x, info) = cg::<f64, _, Plain>(&a, &b, None, 200, 1e-10, None).unwrap();
        assert!(info.converged, "{}", info);
        let ax = a.apply(&x).unwrap();
        for (u, v) in ax.iter().zip(b.iter()) {
            assert!((u - v).abs() < 1e-8);
        }
    }

    #[test]
    fn test_cg_jacobi_and_warm_start() {
        let a = laplacian(30);
        let b = vec![1.0; 30];
        let jacobi = JacobiPreconditioner::from_diagonal(&[2.5; 30]).unwrap();
        let (x, info) = cg(&a, &b, None, 200, 1e-10, Some(&jacobi)).unwrap();
        assert!(info.converged);

        // Starting at the solution converges immediately
        let (_, warm) = cg(&a, &b, Some(x.as_slice()), 200, 1e-6, Some(&jacobi)).unwrap();
        assert_eq!(warm.iterations, 0);
    }

    #[test]
    fn test_cg_zero_rhs() {
        let a = laplacian(4);
        let (x, info) = cg::<f64, _, Plain>(&a, &[0.0; 4], None, 10, 1e-8, None).unwrap();
        assert!(info.converged);
        assert!(x.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_cg_breakdown_on_indefinite() {
        let a = Square(CsrMatrix::from_triplets((2, 2), &[(0, 0, 1.0), (1, 1, -1.0)]).unwrap());
        let err = cg::<f64, _, Plain>(&a, &[0.0, 1.0], None, 10, 1e-8, None).unwrap_err();
        assert!(matches!(err, SparseError::Operation(_)));
    }

    #[test]
    fn test_cg_size_mismatch() {
        let a = laplacian(3);
        assert!(cg::<f64, _, Plain>(&a, &[1.0; 2], None, 10, 1e-8, None).is_err());
    }

    #[test]
    fn test_jacobi_rejects_zero_diagonal() {
        assert!(JacobiPreconditioner::<f64>::from_diagonal(&[1.0, 0.0]).is_err());
    }
}
