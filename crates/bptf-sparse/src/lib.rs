//! # bptf-sparse
//!
//! Sparse side-information support for BPTF.
//!
//! This crate provides:
//! - CSR (Compressed Sparse Row) feature matrices
//! - Matrix-free linear operators
//! - Conjugate gradient, plain or with Jacobi preconditioning
//!
//! # SciRS2 Integration
//!
//! All operations use `scirs2_core` types. Direct use of `ndarray` is forbidden.

pub mod csr;
pub mod error;
pub mod solvers;

pub use csr::*;
pub use error::*;
pub use solvers::{cg, JacobiPreconditioner, LinearOperator, Preconditioner, SolverInfo};
