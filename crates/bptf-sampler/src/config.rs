//! Session configuration

use crate::model::ModelInit;
use crate::priors::PriorKind;
use bptf_core::{BptfError, BptfResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_NUM_LATENT: usize = 96;
pub const DEFAULT_BURNIN: usize = 200;
pub const DEFAULT_NSAMPLES: usize = 800;

/// Never save samples
pub const SAVE_NEVER: i64 = 0;
/// Save only the final sample
pub const SAVE_FINAL_ONLY: i64 = -1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Latent dimensions per entity
    pub num_latent: usize,
    pub burnin: usize,
    pub nsamples: usize,
    /// Master seed; drawn from the clock when unset
    pub seed: Option<u64>,
    /// Worker threads (0 = available parallelism)
    pub num_threads: usize,
    pub init: ModelInit,
    /// Prior per mode; empty means `Default` for every mode
    pub priors: Vec<PriorKind>,
    /// `0` never, `n > 0` every n-th sample, `-1` final sample only
    pub save_freq: i64,
    /// Write a checkpoint every n iterations (0 disables)
    pub checkpoint_freq: usize,
    pub save_dir: Option<PathBuf>,
    /// Classification threshold; enables AUC reporting
    pub threshold: Option<f64>,
    pub verbose: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            num_latent: DEFAULT_NUM_LATENT,
            burnin: DEFAULT_BURNIN,
            nsamples: DEFAULT_NSAMPLES,
            seed: None,
            num_threads: 0,
            init: ModelInit::Random,
            priors: Vec::new(),
            save_freq: SAVE_NEVER,
            checkpoint_freq: 0,
            save_dir: None,
            threshold: None,
            verbose: 1,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_num_latent(mut self, num_latent: usize) -> Self {
        self.num_latent = num_latent;
        self
    }

    pub fn with_burnin(mut self, burnin: usize) -> Self {
        self.burnin = burnin;
        self
    }

    pub fn with_nsamples(mut self, nsamples: usize) -> Self {
        self.nsamples = nsamples;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_init(mut self, init: ModelInit) -> Self {
        self.init = init;
        self
    }

    pub fn with_priors(mut self, priors: Vec<PriorKind>) -> Self {
        self.priors = priors;
        self
    }

    pub fn with_save_freq(mut self, save_freq: i64) -> Self {
        self.save_freq = save_freq;
        self
    }

    pub fn with_checkpoint_freq(mut self, checkpoint_freq: usize) -> Self {
        self.checkpoint_freq = checkpoint_freq;
        self
    }

    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(dir.into());
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    /// Total number of Gibbs iterations
    pub fn total_iterations(&self) -> usize {
        self.burnin + self.nsamples
    }

    /// Whether the `sample`-th sample (1-based) is saved
    pub fn saves_sample(&self, sample: usize) -> bool {
        match self.save_freq {
            SAVE_NEVER => false,
            SAVE_FINAL_ONLY => sample == self.nsamples,
            n => sample % n as usize == 0,
        }
    }

    /// Whether a checkpoint follows the `iteration`-th completed iteration
    pub fn checkpoints_at(&self, iteration: usize) -> bool {
        self.checkpoint_freq > 0
            && (iteration % self.checkpoint_freq == 0 || iteration == self.total_iterations())
    }

    /// # Errors
    ///
    /// [`BptfError::Configuration`] for any inconsistent setting.
    pub fn validate(&self) -> BptfResult<()> {
        if self.num_latent == 0 {
            return Err(BptfError::configuration("num_latent must be positive"));
        }
        if self.nsamples == 0 {
            return Err(BptfError::configuration("nsamples must be positive"));
        }
        if self.save_freq < SAVE_FINAL_ONLY {
            return Err(BptfError::configuration(format!(
                "save_freq must be -1, 0 or positive, got {}",
                self.save_freq
            )));
        }
        let persists = self.save_freq != SAVE_NEVER || self.checkpoint_freq > 0;
        if persists && self.save_dir.is_none() {
            return Err(BptfError::configuration(
                "saving samples or checkpoints needs a save directory",
            ));
        }
        if let Some(t) = self.threshold {
            if !t.is_finite() {
                return Err(BptfError::configuration(format!(
                    "classification threshold must be finite, got {}",
                    t
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.num_latent, 96);
        assert_eq!(config.total_iterations(), 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(SessionConfig::new().with_num_latent(0).validate().is_err());
        assert!(SessionConfig::new().with_save_freq(-2).validate().is_err());
        assert!(SessionConfig::new().with_save_freq(5).validate().is_err());
        assert!(SessionConfig::new()
            .with_save_freq(5)
            .with_save_dir("/tmp/bptf")
            .validate()
            .is_ok());
        assert!(SessionConfig::new()
            .with_threshold(f64::NAN)
            .validate()
            .unwrap_err()
            .is_configuration());
    }

    #[test]
    fn test_save_schedule() {
        let every_3 = SessionConfig::new().with_nsamples(10).with_save_freq(3);
        let saved: Vec<usize> = (1..=10).filter(|&s| every_3.saves_sample(s)).collect();
        assert_eq!(saved, vec![3, 6, 9]);

        let last = SessionConfig::new().with_nsamples(10).with_save_freq(SAVE_FINAL_ONLY);
        assert!(last.saves_sample(10) && !last.saves_sample(9));

        let ckpt = SessionConfig::new()
            .with_burnin(5)
            .with_nsamples(6)
            .with_checkpoint_freq(4);
        let at: Vec<usize> = (1..=11).filter(|&i| ckpt.checkpoints_at(i)).collect();
        assert_eq!(at, vec![4, 8, 11]);
    }

    #[test]
    fn test_serde_fills_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"num_latent": 8, "priors": ["macau", "normal"]}"#).unwrap();
        assert_eq!(config.num_latent, 8);
        assert_eq!(config.burnin, DEFAULT_BURNIN);
        assert_eq!(config.priors, vec![PriorKind::Macau, PriorKind::Normal]);
    }
}
