//! # bptf-sampler
//!
//! Gibbs sampling engine for Bayesian probabilistic matrix and tensor
//! factorization.
//!
//! This crate provides:
//! - Conjugate Normal-Wishart and Normal-Gamma updates
//! - Noise models (fixed, sampled, adaptive, probit)
//! - Latent priors, with and without side information
//! - A [`Session`] running burn-in and sampling on a worker pool
//! - Running predictions with RMSE and AUC on held-out cells
//! - Checkpointing with atomic writes and resume
//! - A [`PredictSession`] over saved posterior samples
//!
//! # Example
//!
//! ```ignore
//! use bptf_core::ObservationSet;
//! use bptf_sampler::{Session, SessionConfig};
//!
//! let train = ObservationSet::sparse(vec![100, 80], entries)?;
//! let config = SessionConfig::new().with_num_latent(16).with_seed(42);
//! let mut session = Session::builder(config).train(train).test(test).build()?;
//! let status = session.run()?;
//! println!("{}", status);
//! ```

pub mod block;
pub mod checkpoint;
pub mod config;
pub mod conjugate;
pub mod model;
pub mod noise;
pub mod pool;
pub mod predict;
pub mod priors;
pub mod result;
pub mod session;
pub mod side_info;
pub mod status;
pub mod tracing_support;


pub use block::{DataBlock, EntityStats};
pub use checkpoint::{CheckpointStore, RootManifest, SnapshotKind, StepEntry, StepSnapshot};
pub use config::{SessionConfig, SAVE_FINAL_ONLY, SAVE_NEVER};
pub use conjugate::{NormalGammaPrior, NormalWishartPrior};
pub use model::{LinkMatrix, Model, ModelInit, ModelRecord};
pub use noise::{NoiseModel, Residuals};
pub use pool::WorkerPool;
pub use predict::PredictSession;
pub use priors::{update_mode, LatentPrior, PriorKind, PriorState, SamplePrior};
pub use result::{PredictionResult, ResultItem, RunningStats};
pub use session::{Session, SessionBuilder};
pub use side_info::{FeatureMatrix, SideInfo, SolveMode};
pub use status::{SessionPhase, StatusRecord};
