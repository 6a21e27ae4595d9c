//! # BPTF - Bayesian Probabilistic Tensor Factorization
//!
//! Gibbs sampling for matrix and tensor completion with Normal-Wishart
//! priors, optional side information per mode, and posterior predictions
//! with uncertainty.
//!
//! This is the **meta crate** that re-exports all BPTF components.
//!
//! ## Quick Start
//!
//! ```
//! use bptf::prelude::*;
//!
//! let train = ObservationSet::dense(
//!     vec![3, 4],
//!     vec![1.0, 5.0, 9.0, 2.0, 6.0, 10.0, 3.0, 7.0, 11.0, 4.0, 8.0, 12.0],
//! )?;
//! let config = SessionConfig::new()
//!     .with_num_latent(4)
//!     .with_burnin(10)
//!     .with_nsamples(10)
//!     .with_seed(1)
//!     .with_num_threads(1)
//!     .with_verbose(0);
//! let mut session = Session::builder(config).train(train).build()?;
//! let status = session.run()?;
//! assert_eq!(status.phase, SessionPhase::Finished);
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Components
//!
//! ### Observations and errors ([`core`])
//!
//! `DataSource`, `ObservationSet`, `NoiseConfig`, `BptfError`, `SamplerRng`.
//!
//! ### Sparse features ([`sparse`])
//!
//! CSR feature matrices and the conjugate gradient solver used for side
//! information.
//!
//! ### Sampler ([`sampler`])
//!
//! Priors, noise models, the session loop, checkpoints and prediction.
//!
//! ```ignore
//! use bptf::prelude::*;
//!
//! let predict = PredictSession::from_dir("run/")?;
//! let stats = predict.predict(&[3, 7])?;
//! println!("{} ± {}", stats.mean, stats.variance().sqrt());
//! ```

pub use bptf_core as core;
pub use bptf_sampler as sampler;
pub use bptf_sparse as sparse;

pub mod prelude {
    //! Prelude module for convenient imports

    // Data and errors
    pub use crate::core::{BptfError, BptfResult, DataSource, NoiseConfig, ObservationSet};

    // Sparse side information
    pub use crate::sparse::CsrMatrix;

    // Sessions
    pub use crate::sampler::{
        ModelInit, PriorKind, Session, SessionConfig, SessionPhase, SideInfo, SolveMode,
        StatusRecord,
    };

    // Results and prediction
    pub use crate::sampler::{PredictSession, PredictionResult, RunningStats};
}
