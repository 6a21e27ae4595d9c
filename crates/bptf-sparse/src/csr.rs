//! CSR (Compressed Sparse Row) feature matrices
//!
//! Side-information features are usually very sparse (one-hot encodings,
//! bag-of-words, fingerprints), with one row per entity and one column per
//! feature. CSR gives cheap access to an entity's features and cheap
//! products with dense latent matrices.
//!
//! # Format
//!
//! For an m×n sparse matrix with nnz non-zeros:
//! - `row_ptr`: `Vec<usize>` of length m+1 - row_ptr\[i\] points to start of row i
//! - `col_indices`: `Vec<usize>` of length nnz - column index for each non-zero
//! - `values`: `Vec<T>` of length nnz - the non-zero values
//! - `shape`: (m, n) - dimensions of the matrix
//!
//! # Examples
//!
//! ```
//! use bptf_sparse::csr::CsrMatrix;
//!
//! // [1.0  0   2.0]
//! // [0    3.0 0  ]
//! let csr = CsrMatrix::from_triplets((2, 3), &[(0, 0, 1.0), (1, 1, 3.0), (0, 2, 2.0)]).unwrap();
//! assert_eq!(csr.nnz(), 3);
//! assert_eq!(csr.row(0).unwrap().0, &[0, 2]);
//! ```

use scirs2_core::ndarray_ext::{Array1, Array2, ArrayView1, ArrayView2};
use scirs2_core::numeric::Float;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CsrError {
    #[error("Invalid row pointers: length {len} for {nrows} rows (expected {expected})")]
    InvalidRowPtr {
        len: usize,
        nrows: usize,
        expected: usize,
    },

    #[error("Row pointer not sorted at index {idx}: {curr} > {next}")]
    RowPtrNotSorted {
        idx: usize,
        curr: usize,
        next: usize,
    },

    #[error("Length mismatch: {col_indices} col_indices but {values} values")]
    LengthMismatch { col_indices: usize, values: usize },

    #[error("Index out of bounds: ({row}, {col}) in {nrows}×{ncols} matrix")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        nrows: usize,
        ncols: usize,
    },

    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    #[error("Shape mismatch: matrix is {nrows}×{ncols}, operand has length {len}")]
    ShapeMismatch {
        nrows: usize,
        ncols: usize,
        len: usize,
    },
}

/// CSR (Compressed Sparse Row) matrix
#[derive(Debug, Clone)]
pub struct CsrMatrix<T> {
    /// Row pointers: row_ptr[i] = start index of row i in col_indices/values
    row_ptr: Vec<usize>,
    col_indices: Vec<usize>,
    values: Vec<T>,
    shape: (usize, usize),
}

impl<T: Float> CsrMatrix<T> {
    /// Create a new CSR matrix
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - row_ptr length is incorrect
    /// - col_indices and values have different lengths
    /// - row_ptr is not monotonically increasing
    /// - any column index is out of bounds
    pub fn new(
        row_ptr: Vec<usize>,
        col_indices: Vec<usize>,
        values: Vec<T>,
        shape: (usize, usize),
    ) -> Result<Self, CsrError> {
        let (nrows, ncols) = shape;

        if nrows == 0 || ncols == 0 {
            return Err(CsrError::InvalidShape(
                "Shape cannot have zeros".to_string(),
            ));
        }

        if row_ptr.len() != nrows + 1 {
            return Err(CsrError::InvalidRowPtr {
                len: row_ptr.len(),
                nrows,
                expected: nrows + 1,
            });
        }

        if col_indices.len() != values.len() {
            return Err(CsrError::LengthMismatch {
                col_indices: col_indices.len(),
                values: values.len(),
            });
        }

        for i in 0..nrows {
            if row_ptr[i] > row_ptr[i + 1] {
                return Err(CsrError::RowPtrNotSorted {
                    idx: i,
                    curr: row_ptr[i],
                    next: row_ptr[i + 1],
                });
            }
        }

        let nnz = col_indices.len();
        if row_ptr[nrows] != nnz {
            return Err(CsrError::InvalidRowPtr {
                len: row_ptr[nrows],
                nrows,
                expected: nnz,
            });
        }

        for row in 0..nrows {
            for &col in &col_indices[row_ptr[row]..row_ptr[row + 1]] {
                if col >= ncols {
                    return Err(CsrError::IndexOutOfBounds {
                        row,
                        col,
                        nrows,
                        ncols,
                    });
                }
            }
        }

        Ok(Self {
            row_ptr,
            col_indices,
            values,
            shape,
        })
    }

    /// Build from unordered (row, col, value) triplets; duplicates are summed
    pub fn from_triplets(
        shape: (usize, usize),
        triplets: &[(usize, usize, T)],
    ) -> Result<Self, CsrError> {
        let (nrows, ncols) = shape;
        if nrows == 0 || ncols == 0 {
            return Err(CsrError::InvalidShape(
                "Shape cannot have zeros".to_string(),
            ));
        }
        for &(row, col, _) in triplets {
            if row >= nrows || col >= ncols {
                return Err(CsrError::IndexOutOfBounds {
                    row,
                    col,
                    nrows,
                    ncols,
                });
            }
        }

        let mut sorted: Vec<(usize, usize, T)> = triplets.to_vec();
        sorted.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

        let mut row_ptr = vec![0usize; nrows + 1];
        let mut col_indices: Vec<usize> = Vec::with_capacity(sorted.len());
        let mut values: Vec<T> = Vec::with_capacity(sorted.len());
        let mut last: Option<(usize, usize)> = None;
        for (row, col, value) in sorted {
            if last == Some((row, col)) {
                if let Some(v) = values.last_mut() {
                    *v = *v + value;
                }
                continue;
            }
            row_ptr[row + 1] += 1;
            col_indices.push(col);
            values.push(value);
            last = Some((row, col));
        }
        for i in 0..nrows {
            row_ptr[i + 1] += row_ptr[i];
        }

        Self::new(row_ptr, col_indices, values, shape)
    }

    /// Convert a dense matrix, dropping entries with `|x| <= threshold`
    pub fn from_dense(dense: &ArrayView2<T>, threshold: T) -> Result<Self, CsrError> {
        let (nrows, ncols) = dense.dim();
        let mut row_ptr = Vec::with_capacity(nrows + 1);
        let mut col_indices = Vec::new();
        let mut values = Vec::new();
        row_ptr.push(0);
        for row in dense.rows() {
            for (col, &v) in row.iter().enumerate() {
                if v.abs() > threshold {
                    col_indices.push(col);
                    values.push(v);
                }
            }
            row_ptr.push(col_indices.len());
        }
        Self::new(row_ptr, col_indices, values, (nrows, ncols))
    }

    /// Number of non-zero elements
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Shape of the matrix (nrows, ncols)
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn nrows(&self) -> usize {
        self.shape.0
    }

    pub fn ncols(&self) -> usize {
        self.shape.1
    }

    /// Get a row as (col_indices, values) slices
    pub fn row(&self, i: usize) -> Option<(&[usize], &[T])> {
        if i >= self.nrows() {
            return None;
        }

        let start = self.row_ptr[i];
        let end = self.row_ptr[i + 1];

        Some((&self.col_indices[start..end], &self.values[start..end]))
    }

    /// Sparse matrix-vector product `y = A x`
    pub fn spmv(&self, x: &ArrayView1<T>) -> Result<Array1<T>, CsrError> {
        if x.len() != self.ncols() {
            return Err(CsrError::ShapeMismatch {
                nrows: self.nrows(),
                ncols: self.ncols(),
                len: x.len(),
            });
        }

        let mut y = Array1::<T>::zeros(self.nrows());
        for row in 0..self.nrows() {
            let mut sum = T::zero();
            for idx in self.row_ptr[row]..self.row_ptr[row + 1] {
                sum = sum + self.values[idx] * x[self.col_indices[idx]];
            }
            y[row] = sum;
        }

        Ok(y)
    }

    /// Transposed product `y = Aᵀ x` without materializing `Aᵀ`
    pub fn spmv_transpose(&self, x: &ArrayView1<T>) -> Result<Array1<T>, CsrError> {
        if x.len() != self.nrows() {
            return Err(CsrError::ShapeMismatch {
                nrows: self.nrows(),
                ncols: self.ncols(),
                len: x.len(),
            });
        }

        let mut y = Array1::<T>::zeros(self.ncols());
        for row in 0..self.nrows() {
            let xr = x[row];
            for idx in self.row_ptr[row]..self.row_ptr[row + 1] {
                let col = self.col_indices[idx];
                y[col] = y[col] + self.values[idx] * xr;
            }
        }

        Ok(y)
    }

    /// Sparse × dense product `C = A B`
    pub fn spmm(&self, b: &ArrayView2<T>) -> Result<Array2<T>, CsrError> {
        if self.ncols() != b.nrows() {
            return Err(CsrError::ShapeMismatch {
                nrows: self.nrows(),
                ncols: self.ncols(),
                len: b.nrows(),
            });
        }

        let mut c = Array2::<T>::zeros((self.nrows(), b.ncols()));
        for row in 0..self.nrows() {
            for idx in self.row_ptr[row]..self.row_ptr[row + 1] {
                let v = self.values[idx];
                let b_row = b.row(self.col_indices[idx]);
                for (k, &bk) in b_row.iter().enumerate() {
                    c[[row, k]] = c[[row, k]] + v * bk;
                }
            }
        }

        Ok(c)
    }

    /// Transposed sparse × dense product `C = Aᵀ B`
    pub fn spmm_transpose(&self, b: &ArrayView2<T>) -> Result<Array2<T>, CsrError> {
        if self.nrows() != b.nrows() {
            return Err(CsrError::ShapeMismatch {
                nrows: self.nrows(),
                ncols: self.ncols(),
                len: b.nrows(),
            });
        }

        let mut c = Array2::<T>::zeros((self.ncols(), b.ncols()));
        for row in 0..self.nrows() {
            let b_row = b.row(row);
            for idx in self.row_ptr[row]..self.row_ptr[row + 1] {
                let col = self.col_indices[idx];
                let v = self.values[idx];
                for (k, &bk) in b_row.iter().enumerate() {
                    c[[col, k]] = c[[col, k]] + v * bk;
                }
            }
        }

        Ok(c)
    }

    /// Dense Gram matrix `AᵀA` (ncols × ncols)
    pub fn gram(&self) -> Array2<T> {
        let n = self.ncols();
        let mut g = Array2::<T>::zeros((n, n));
        for row in 0..self.nrows() {
            let (start, end) = (self.row_ptr[row], self.row_ptr[row + 1]);
            for a in start..end {
                let (ca, va) = (self.col_indices[a], self.values[a]);
                for b in start..end {
                    let cb = self.col_indices[b];
                    g[[ca, cb]] = g[[ca, cb]] + va * self.values[b];
                }
            }
        }
        g
    }

    /// Squared column norms, i.e. the diagonal of `AᵀA`
    pub fn column_sq_norms(&self) -> Vec<T> {
        let mut norms = vec![T::zero(); self.ncols()];
        for (&col, &v) in self.col_indices.iter().zip(self.values.iter()) {
            norms[col] = norms[col] + v * v;
        }
        norms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray_ext::array;

    fn sample() -> CsrMatrix<f64> {
        // [1 0 2 0]
        // [0 3 0 0]
        // [4 0 0 5]
        CsrMatrix::new(
            vec![0, 2, 3, 5],
            vec![0, 2, 1, 0, 3],
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
            (3, 4),
        )
        .unwrap()
    }

    fn dense(csr: &CsrMatrix<f64>) -> Array2<f64> {
        let mut out = Array2::zeros(csr.shape());
        for i in 0..csr.nrows() {
            if let Some((cols, vals)) = csr.row(i) {
                for (&c, &v) in cols.iter().zip(vals.iter()) {
                    out[[i, c]] = v;
                }
            }
        }
        out
    }

    #[test]
    fn test_csr_creation() {
        let csr = sample();
        assert_eq!(csr.nnz(), 5);
        assert_eq!(csr.shape(), (3, 4));
    }

    #[test]
    fn test_csr_invalid() {
        assert!(CsrMatrix::<f64>::new(vec![0, 1], vec![4], vec![1.0], (1, 4)).is_err());
        assert!(CsrMatrix::<f64>::new(vec![0, 2, 1], vec![0, 1], vec![1.0, 1.0], (2, 2)).is_err());
        assert!(CsrMatrix::<f64>::from_triplets((2, 2), &[(2, 0, 1.0)]).is_err());
    }

    #[test]
    fn test_csr_row_access() {
        let csr = sample();
        let (cols, vals) = csr.row(2).unwrap();
        assert_eq!(cols, &[0, 3]);
        assert_eq!(vals, &[4.0, 5.0]);
        assert!(csr.row(3).is_none());
    }

    #[test]
    fn test_from_triplets_sums_duplicates() {
        let csr = CsrMatrix::from_triplets(
            (2, 2),
            &[(1, 1, 2.0), (0, 1, 1.0), (1, 1, 3.0)],
        )
        .unwrap();
        assert_eq!(csr.nnz(), 2);
        assert_eq!(dense(&csr), array![[0.0, 1.0], [0.0, 5.0]]);
    }

    #[test]
    fn test_products_match_dense() {
        let csr = sample();
        let dense = dense(&csr);
        let x = array![1.0, -1.0, 0.5, 2.0];
        assert_eq!(csr.spmv(&x.view()).unwrap(), dense.dot(&x));

        let y = array![1.0, 2.0, -1.0];
        assert_eq!(csr.spmv_transpose(&y.view()).unwrap(), dense.t().dot(&y));

        let b = array![[1.0, 0.0], [2.0, 1.0], [0.0, 3.0], [1.0, 1.0]];
        assert_eq!(csr.spmm(&b.view()).unwrap(), dense.dot(&b));

        let c = array![[1.0, 2.0], [0.0, 1.0], [3.0, -1.0]];
        assert_eq!(csr.spmm_transpose(&c.view()).unwrap(), dense.t().dot(&c));

        assert_eq!(csr.gram(), dense.t().dot(&dense));
        assert_eq!(csr.column_sq_norms(), vec![17.0, 9.0, 4.0, 25.0]);
    }

    #[test]
    fn test_shape_mismatch() {
        let csr = sample();
        let x = array![1.0, 2.0];
        assert!(csr.spmv(&x.view()).is_err());
        assert!(csr.spmv_transpose(&x.view()).is_err());
    }

    #[test]
    fn test_from_dense_threshold() {
        let dense = array![[0.0, 1e-12, 2.0], [3.0, 0.0, 0.0]];
        let csr = CsrMatrix::from_dense(&dense.view(), 1e-10).unwrap();
        assert_eq!(csr.nnz(), 2);
        assert_eq!(csr.row(0).unwrap().0, &[2]);
        assert_eq!(csr.row(1).unwrap(), (&[0usize][..], &[3.0][..]));
    }
}
