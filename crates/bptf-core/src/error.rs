//! Unified error type for the sampling engine
//!
//! Every fallible operation in the BPTF crates returns [`BptfResult`]. The
//! variants mirror the three failure categories a sampling run can hit:
//!
//! - **Configuration**: rejected before the first sweep (dimension mismatches,
//!   missing hyperparameters, invalid options)
//! - **Numerical**: a matrix that must be positive-definite is not; fatal for
//!   the chain
//! - **I/O**: checkpoint reads and writes
//!
//! plus a few supporting categories for malformed data, corrupt snapshots and
//! state-machine misuse.
//!
//! # Examples
//!
//! ```
//! use bptf_core::error::{BptfError, BptfResult};
//!
//! fn check_latent(num_latent: usize) -> BptfResult<()> {
//!     if num_latent == 0 {
//!         return Err(BptfError::configuration("num_latent must be positive"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_latent(0).unwrap_err().is_configuration());
//! ```

use thiserror::Error;

/// Top-level error for the sampling engine
#[derive(Error, Debug)]
pub enum BptfError {
    /// Invalid session, prior or side-info configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Non-positive-definite matrix or failed factorization
    #[error("Numerical error: {0}")]
    Numerical(String),

    /// Malformed observation data (out-of-range coordinates, non-finite values)
    #[error("Data error: {0}")]
    Data(String),

    /// Checkpoint storage failure
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Snapshot encoding or decoding failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted snapshot failed validation
    #[error("Corrupt checkpoint '{name}': {reason}")]
    CorruptCheckpoint { name: String, reason: String },

    /// An operation was called in the wrong session phase
    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

/// Result alias used throughout the workspace
pub type BptfResult<T> = Result<T, BptfError>;

impl BptfError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn numerical(msg: impl Into<String>) -> Self {
        Self::Numerical(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        Self::Data(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Wrap an `std::io::Error` with a description of what was being done
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn corrupt(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptCheckpoint {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_numerical(&self) -> bool {
        matches!(self, Self::Numerical(_))
    }

    /// True for storage-side failures (I/O, encoding, corrupt snapshots)
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::Serialization(_) | Self::CorruptCheckpoint { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(BptfError::configuration("x").is_configuration());
        assert!(BptfError::numerical("x").is_numerical());
        let io = BptfError::io(
            "writing root.json",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert!(io.is_io());
        assert!(!io.is_numerical());
        assert!(BptfError::corrupt("checkpoint-3", "checksum").is_io());
    }

    #[test]
    fn test_error_display() {
        let err = BptfError::io(
            "writing checkpoint-10",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        let msg = err.to_string();
        assert!(msg.contains("writing checkpoint-10"));
        assert!(msg.contains("missing"));

        let err = BptfError::corrupt("sample-4", "checksum mismatch");
        assert_eq!(
            err.to_string(),
            "Corrupt checkpoint 'sample-4': checksum mismatch"
        );
    }
}
