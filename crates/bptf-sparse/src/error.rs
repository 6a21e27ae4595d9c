//! Error types for sparse feature matrices and iterative solvers

use bptf_core::BptfError;
use thiserror::Error;

/// Top-level error type for sparse operations
#[derive(Error, Debug)]
pub enum SparseError {
    /// CSR construction errors
    #[error("CSR error: {0}")]
    Csr(#[from] crate::csr::CsrError),

    /// Invalid arguments (dimension mismatches, bad tolerances)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Solver breakdowns
    #[error("Operation error: {0}")]
    Operation(String),
}

impl SparseError {
    pub fn validation(msg: &str) -> Self {
        Self::Validation(msg.to_string())
    }

    pub fn operation(msg: &str) -> Self {
        Self::Operation(msg.to_string())
    }
}

/// Result type for sparse operations
pub type SparseResult<T> = Result<T, SparseError>;

impl From<SparseError> for BptfError {
    fn from(err: SparseError) -> Self {
        match err {
            SparseError::Operation(msg) => BptfError::Numerical(msg),
            SparseError::Csr(e) => BptfError::Configuration(e.to_string()),
            SparseError::Validation(msg) => BptfError::Configuration(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_categories() {
        let e: BptfError = SparseError::operation("CG breakdown").into();
        assert!(e.is_numerical());
        let e: BptfError = SparseError::validation("rhs size").into();
        assert!(e.is_configuration());
    }
}
