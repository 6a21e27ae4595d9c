//! Prediction from saved posterior samples
//!
//! A [`PredictSession`] loads every sample snapshot of a store and averages
//! predictions over them. It never changes the models it holds.

use crate::checkpoint::CheckpointStore;
use crate::model::Model;
use crate::result::{PredictionResult, RunningStats};
use bptf_core::{BptfError, BptfResult, DataSource};
use scirs2_core::ndarray_ext::ArrayView1;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct PredictSession {
    models: Vec<Model>,
}

impl PredictSession {
    /// Load every saved sample of `store`, in save order
    ///
    /// # Errors
    ///
    /// [`BptfError::Configuration`] when the store holds no samples, and
    /// any read or checksum error of the snapshots.
    pub fn from_store(store: &CheckpointStore) -> BptfResult<Self> {
        let models = store
            .read_samples()?
            .iter()
            .map(|snapshot| Model::from_record(&snapshot.model))
            .collect::<BptfResult<Vec<_>>>()?;
        if models.is_empty() {
            return Err(BptfError::configuration(format!(
                "no saved samples in {}",
                store.dir().display()
            )));
        }
        info!(samples = models.len(), dir = %store.dir().display(), "loaded samples");
        Self::from_models(models)
    }

    pub fn from_dir(dir: impl AsRef<Path>) -> BptfResult<Self> {
        Self::from_store(&CheckpointStore::open_existing(dir)?)
    }

    /// # Errors
    ///
    /// [`BptfError::Configuration`] if `models` is empty or the models do
    /// not share one shape.
    pub fn from_models(models: Vec<Model>) -> BptfResult<Self> {
        let first = models
            .first()
            .ok_or_else(|| BptfError::configuration("predict session needs at least one model"))?;
        let (dims, num_latent) = (first.dims(), first.num_latent());
        if let Some(odd) = models
            .iter()
            .find(|m| m.dims() != dims || m.num_latent() != num_latent)
        {
            return Err(BptfError::configuration(format!(
                "samples disagree on shape: {:?} x {} vs {:?} x {}",
                dims,
                num_latent,
                odd.dims(),
                odd.num_latent()
            )));
        }
        Ok(Self { models })
    }

    pub fn num_samples(&self) -> usize {
        self.models.len()
    }

    pub fn models(&self) -> &[Model] {
        &self.models
    }

    /// Shape shared by every sample; the constructors reject empty sets
    pub fn dims(&self) -> Vec<usize> {
        self.models.first().map(Model::dims).unwrap_or_default()
    }

    fn check_coords(&self, coords: &[usize]) -> BptfResult<()> {
        let dims = self.dims();
        if coords.len() != dims.len() || coords.iter().zip(&dims).any(|(c, d)| c >= d) {
            return Err(BptfError::data(format!(
                "coordinates {:?} outside a model of shape {:?}",
                coords, dims
            )));
        }
        Ok(())
    }

    /// Posterior mean and variance of the cell at `coords`
    pub fn predict(&self, coords: &[usize]) -> BptfResult<RunningStats> {
        self.check_coords(coords)?;
        let mut stats = RunningStats::default();
        for model in &self.models {
            stats.push(model.predict(coords));
        }
        Ok(stats)
    }

    /// Predictions for every cell of `data`, averaged over all samples
    pub fn predict_observations(&self, data: &dyn DataSource) -> BptfResult<PredictionResult> {
        for (coords, _) in data.iter() {
            self.check_coords(coords)?;
        }
        let mut result = PredictionResult::from_test(data);
        for model in &self.models {
            result.accumulate(model, true);
        }
        Ok(result)
    }

    /// Predict a new entity of `mode` from its side features
    ///
    /// The entity's latent vector is `mu + βᵀ f` in each sample; it is
    /// scored against every entity of the other mode of a matrix model.
    pub fn predict_from_features(
        &self,
        mode: usize,
        features: &ArrayView1<f64>,
    ) -> BptfResult<Vec<RunningStats>> {
        let dims = self.dims();
        if dims.len() != 2 || mode > 1 {
            return Err(BptfError::configuration(format!(
                "prediction from features needs a matrix model and mode 0 or 1, got shape {:?} and mode {}",
                dims, mode
            )));
        }
        let other = 1 - mode;
        let mut stats = vec![RunningStats::default(); dims[other]];
        for model in &self.models {
            let link = model.link_matrix(mode).ok_or_else(|| {
                BptfError::configuration(format!("mode {} was not sampled with side information", mode))
            })?;
            if link.beta.nrows() != features.len() {
                return Err(BptfError::data(format!(
                    "{} features given, the link matrix expects {}",
                    features.len(),
                    link.beta.nrows()
                )));
            }
            let latent = &link.mu + &link.beta.t().dot(features);
            let scores = model.factor(other).t().dot(&latent);
            for (s, score) in stats.iter_mut().zip(scores.iter()) {
                s.push(*score);
            }
        }
        Ok(stats)
    }
}
