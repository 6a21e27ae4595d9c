//! # bptf-core
//!
//! Foundation types for the BPTF sampling engine.
//!
//! This crate provides:
//! - [`BptfError`] / [`BptfResult`]: the error type shared by every crate
//! - [`DataSource`] and [`ObservationSet`]: typed in-memory observations
//! - [`NoiseConfig`]: the noise model requested for a data source
//! - [`linalg`]: Cholesky-based dense linear algebra
//! - [`SamplerRng`]: the explicit random-number context
//!
//! # SciRS2 Integration
//!
//! Arrays come from `scirs2_core::ndarray_ext`, random numbers from
//! `scirs2_core::random`, and factorizations from `scirs2_linalg`. Direct use
//! of `ndarray` or `rand` is not allowed.

pub mod data;
pub mod error;
pub mod linalg;
pub mod noise_config;
pub mod random;


pub use data::{DataKind, DataSource, ObservationSet};
pub use error::{BptfError, BptfResult};
pub use noise_config::NoiseConfig;
pub use random::{worker_seed, SamplerRng, WORKER_SEED_STRIDE};
