//! Per-iteration status record

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a sampling session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Uninitialized,
    Initialized,
    BurningIn,
    Sampling,
    Finished,
    /// An iteration returned an error; the session cannot continue
    Failed,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "Uninitialized",
            Self::Initialized => "Initialized",
            Self::BurningIn => "Burnin",
            Self::Sampling => "Sample",
            Self::Finished => "Finished",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Snapshot of progress and diagnostics after an iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    /// Completed iterations
    pub iteration: usize,
    pub phase: SessionPhase,
    pub elapsed_secs: f64,
    pub rmse_avg: Option<f64>,
    pub rmse_1sample: Option<f64>,
    pub auc_avg: Option<f64>,
    pub auc_1sample: Option<f64>,
    /// One line per mode
    pub priors: Vec<String>,
    /// One line per data block
    pub noise: Vec<String>,
}

fn metric(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v))
}

impl fmt::Display for StatusRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:>5}: RMSE {} (1samp: {})",
            self.phase,
            self.iteration,
            metric(self.rmse_avg),
            metric(self.rmse_1sample)
        )?;
        if self.auc_avg.is_some() || self.auc_1sample.is_some() {
            write!(
                f,
                " AUC {} (1samp: {})",
                metric(self.auc_avg),
                metric(self.auc_1sample)
            )?;
        }
        write!(f, " [{:.1}s]", self.elapsed_secs)
    }
}
