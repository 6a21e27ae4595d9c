//! Dense linear algebra for the conjugate updates
//!
//! Everything the sampler needs is built on `scirs2_linalg`'s Cholesky
//! factorization and triangular solves: SPD solves and SPD inversion go
//! through the factor. A failed
//! factorization is reported as [`BptfError::Numerical`]; there is no
//! jitter or other silent repair.
//!
//! Factor matrices are stored D × N (one column per entity), so the Gram
//! matrix of a factor is `U Uᵀ`.

use crate::error::{BptfError, BptfResult};
use scirs2_core::ndarray_ext::{Array1, Array2, ArrayView1, ArrayView2};

/// Replace `a` by `(a + aᵀ) / 2`
pub fn symmetrize(a: &mut Array2<f64>) {
    let n = a.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let v = 0.5 * (a[[i, j]] + a[[j, i]]);
            a[[i, j]] = v;
            a[[j, i]] = v;
        }
    }
}

/// Lower Cholesky factor `L` with `a = L Lᵀ`
///
/// The input is symmetrized first; round-off asymmetry from accumulated
/// sufficient statistics is expected.
///
/// # Errors
///
/// [`BptfError::Numerical`] if `a` is not square, not finite, or not
/// positive-definite.
pub fn cholesky_lower(a: &ArrayView2<f64>) -> BptfResult<Array2<f64>> {
    let (rows, cols) = a.dim();
    if rows != cols {
        return Err(BptfError::numerical(format!(
            "Cholesky requires a square matrix, got {}x{}",
            rows, cols
        )));
    }
    if a.iter().any(|v| !v.is_finite()) {
        return Err(BptfError::numerical(
            "Cholesky input contains non-finite entries",
        ));
    }

    let mut sym = a.to_owned();
    symmetrize(&mut sym);

    let l = scirs2_linalg::cholesky(&sym.view(), None).map_err(|e| {
        BptfError::numerical(format!(
            "Cholesky decomposition failed (matrix is not positive definite): {}",
            e
        ))
    })?;

    for i in 0..rows {
        let d = l[[i, i]];
        if !(d.is_finite() && d > 0.0) {
            return Err(BptfError::numerical(format!(
                "Cholesky factor has non-positive pivot {} at index {}",
                d, i
            )));
        }
    }
    Ok(l)
}

fn triangular(
    t: &ArrayView2<f64>,
    b: &ArrayView1<f64>,
    lower: bool,
    what: &str,
) -> BptfResult<Array1<f64>> {
    scirs2_linalg::solve_triangular(t, b, lower, false)
        .map_err(|e| BptfError::numerical(format!("{} failed: {}", what, e)))
}

/// Solve `L x = b` for lower-triangular `L`
pub fn solve_lower(l: &ArrayView2<f64>, b: &ArrayView1<f64>) -> BptfResult<Array1<f64>> {
    triangular(l, b, true, "forward substitution")
}

/// Solve `Lᵀ x = b` for lower-triangular `L`
pub fn solve_lower_transpose(
    l: &ArrayView2<f64>,
    b: &ArrayView1<f64>,
) -> BptfResult<Array1<f64>> {
    triangular(&l.t(), b, false, "back substitution")
}

/// Solve `A x = b` given the lower Cholesky factor of `A`
pub fn chol_solve(l: &ArrayView2<f64>, b: &ArrayView1<f64>) -> BptfResult<Array1<f64>> {
    let y = solve_lower(l, b)?;
    solve_lower_transpose(l, &y.view())
}

/// Solve `A X = B` column by column given the lower Cholesky factor of `A`
pub fn chol_solve_matrix(l: &ArrayView2<f64>, b: &ArrayView2<f64>) -> BptfResult<Array2<f64>> {
    let mut x = Array2::<f64>::zeros(b.dim());
    for (j, col) in b.columns().into_iter().enumerate() {
        let sol = chol_solve(l, &col)?;
        x.column_mut(j).assign(&sol);
    }
    Ok(x)
}

/// Inverse of a symmetric positive-definite matrix
///
/// Goes through the Cholesky factor rather than a general LU inverse, so
/// the result is exactly symmetric and an indefinite input is an error.
pub fn inverse_spd(a: &ArrayView2<f64>) -> BptfResult<Array2<f64>> {
    let l = cholesky_lower(a)?;
    let identity = Array2::<f64>::eye(a.nrows());
    let mut inv = chol_solve_matrix(&l.view(), &identity.view())?;
    symmetrize(&mut inv);
    Ok(inv)
}

/// `a bᵀ`
pub fn outer(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> Array2<f64> {
    Array2::from_shape_fn((a.len(), b.len()), |(i, j)| a[i] * b[j])
}

/// Add `scale · v vᵀ` into `acc`
pub fn add_outer(acc: &mut Array2<f64>, v: &ArrayView1<f64>, scale: f64) {
    let n = v.len();
    for i in 0..n {
        let vi = scale * v[i];
        for j in 0..n {
            acc[[i, j]] += vi * v[j];
        }
    }
}

/// Gram matrix `U Uᵀ` of a D × N factor
pub fn gram(factor: &ArrayView2<f64>) -> Array2<f64> {
    factor.dot(&factor.t())
}

/// Hadamard product of the Gram matrices of every factor except `skip`
///
/// Computes `G = ⊙_{m ≠ skip} U_m U_mᵀ`. For a fully observed tensor this is
/// `Σ v vᵀ` over all neighbour vectors of any entity in mode `skip`.
pub fn hadamard_gram_except(factors: &[ArrayView2<f64>], skip: usize) -> Array2<f64> {
    let d = factors.first().map(|f| f.nrows()).unwrap_or(0);
    let mut acc = Array2::<f64>::ones((d, d));
    for (m, factor) in factors.iter().enumerate() {
        if m == skip {
            continue;
        }
        acc *= &gram(factor);
    }
    acc
}
