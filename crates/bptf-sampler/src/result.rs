//! Running predictions on held-out cells
//!
//! Every held-out cell keeps a Welford accumulator over the post-burn-in
//! predictions, so the posterior mean and variance are available at any
//! iteration without storing individual samples. The accumulator state
//! `(n, mean, M2)` is serialized exactly, so a resumed run continues the
//! same sequence it would have produced uninterrupted.

use crate::model::Model;
use bptf_core::DataSource;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Welford running mean and variance
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunningStats {
    pub n: usize,
    pub mean: f64,
    /// Sum of squared deviations from the running mean
    pub m2: f64,
}

impl RunningStats {
    pub fn push(&mut self, x: f64) {
        self.n += 1;
        let delta = x - self.mean;
        self.mean += delta / self.n as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Sample variance; zero with fewer than two values
    pub fn variance(&self) -> f64 {
        if self.n > 1 {
            self.m2 / (self.n - 1) as f64
        } else {
            0.0
        }
    }
}

/// One held-out cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultItem {
    pub coords: Vec<usize>,
    pub value: f64,
    /// Prediction of the latest model
    pub pred_1sample: f64,
    pub stats: RunningStats,
}

impl ResultItem {
    pub fn new(coords: Vec<usize>, value: f64) -> Self {
        Self {
            coords,
            value,
            pred_1sample: 0.0,
            stats: RunningStats::default(),
        }
    }

    /// Posterior mean prediction
    pub fn pred_avg(&self) -> f64 {
        self.stats.mean
    }

    pub fn variance(&self) -> f64 {
        self.stats.variance()
    }

    pub fn nsamples(&self) -> usize {
        self.stats.n
    }

    fn update(&mut self, prediction: f64, is_sample: bool) {
        self.pred_1sample = prediction;
        if is_sample {
            self.stats.push(prediction);
        }
    }
}

/// Predictions for every held-out cell
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    items: Vec<ResultItem>,
    /// Values above the threshold count as positive for AUC
    threshold: Option<f64>,
}

impl PredictionResult {
    pub fn from_test(test: &dyn DataSource) -> Self {
        Self {
            items: test
                .iter()
                .map(|(coords, value)| ResultItem::new(coords.to_vec(), value))
                .collect(),
            threshold: None,
        }
    }

    pub fn with_threshold(mut self, threshold: Option<f64>) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn items(&self) -> &[ResultItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    /// Number of samples folded into the averages
    pub fn nsamples(&self) -> usize {
        self.items.first().map_or(0, ResultItem::nsamples)
    }

    /// Record the predictions of `model`; only samples enter the averages
    pub fn accumulate(&mut self, model: &Model, is_sample: bool) {
        self.items.par_iter_mut().for_each(|item| {
            let prediction = model.predict(&item.coords);
            item.update(prediction, is_sample);
        });
    }

    fn rmse_by(&self, pred: impl Fn(&ResultItem) -> f64) -> Option<f64> {
        if self.items.is_empty() {
            return None;
        }
        let sse: f64 = self
            .items
            .iter()
            .map(|item| {
                let e = item.value - pred(item);
                e * e
            })
            .sum();
        Some((sse / self.items.len() as f64).sqrt())
    }

    /// RMSE of the posterior mean predictions
    pub fn rmse_avg(&self) -> Option<f64> {
        if self.nsamples() == 0 {
            return None;
        }
        self.rmse_by(ResultItem::pred_avg)
    }

    /// RMSE of the latest model alone
    pub fn rmse_1sample(&self) -> Option<f64> {
        self.rmse_by(|item| item.pred_1sample)
    }

    fn auc_by(&self, pred: impl Fn(&ResultItem) -> f64) -> Option<f64> {
        let threshold = self.threshold?;
        let mut scored: Vec<(f64, bool)> = self
            .items
            .iter()
            .map(|item| (pred(item), item.value > threshold))
            .collect();
        let npos = scored.iter().filter(|(_, positive)| *positive).count();
        let nneg = scored.len() - npos;
        if npos == 0 || nneg == 0 {
            return None;
        }
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        // Each negative scores the positives ranked above it; ties count half
        let mut area = 0.0;
        let mut positives_above = 0.0;
        let mut i = 0;
        while i < scored.len() {
            let mut j = i;
            let (mut tie_pos, mut tie_neg) = (0.0, 0.0);
            while j < scored.len() && scored[j].0 == scored[i].0 {
                if scored[j].1 {
                    tie_pos += 1.0;
                } else {
                    tie_neg += 1.0;
                }
                j += 1;
            }
            area += tie_neg * (positives_above + 0.5 * tie_pos);
            positives_above += tie_pos;
            i = j;
        }
        Some(area / (npos as f64 * nneg as f64))
    }

    /// AUC of the posterior mean predictions (needs a threshold)
    pub fn auc_avg(&self) -> Option<f64> {
        if self.nsamples() == 0 {
            return None;
        }
        self.auc_by(ResultItem::pred_avg)
    }

    pub fn auc_1sample(&self) -> Option<f64> {
        self.auc_by(|item| item.pred_1sample)
    }
}
