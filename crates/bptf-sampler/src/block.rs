//! Data blocks: one observation source plus its noise model
//!
//! A block places its source inside the model's entity space at a per-mode
//! offset, so auxiliary sources can share some modes with the training data
//! and extend others. Each model mode is as large as the furthest block
//! reaches along it.

use crate::model::Model;
use crate::noise::{NoiseModel, Residuals};
use bptf_core::linalg::{add_outer, hadamard_gram_except};
use bptf_core::{BptfError, BptfResult, DataSource, SamplerRng};
use scirs2_core::ndarray_ext::{s, Array1, Array2, ArrayView2};

/// Likelihood statistics of one entity: `Σ α v vᵀ` and `Σ α y v`
#[derive(Debug, Clone, PartialEq)]
pub struct EntityStats {
    pub precision: Array2<f64>,
    pub rhs: Array1<f64>,
}

impl EntityStats {
    pub fn new(num_latent: usize) -> Self {
        Self {
            precision: Array2::zeros((num_latent, num_latent)),
            rhs: Array1::zeros(num_latent),
        }
    }
}

/// Observations, noise state and placement of one data source
pub struct DataBlock {
    source: Box<dyn DataSource>,
    noise: NoiseModel,
    offsets: Vec<usize>,
}

impl std::fmt::Debug for DataBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataBlock")
            .field("dims", &self.source.dims())
            .field("nnz", &self.source.nnz())
            .field("noise", &self.noise)
            .field("offsets", &self.offsets)
            .finish()
    }
}

impl DataBlock {
    /// Wrap a source placed at `offsets` (one per mode)
    pub fn new(source: Box<dyn DataSource>, offsets: Vec<usize>) -> BptfResult<Self> {
        if offsets.len() != source.nmodes() {
            return Err(BptfError::configuration(format!(
                "data block has {} modes but {} offsets",
                source.nmodes(),
                offsets.len()
            )));
        }
        let noise = NoiseModel::from_config(&source.noise_config())?;
        Ok(Self {
            source,
            noise,
            offsets,
        })
    }

    /// Block placed at the origin of every mode
    pub fn at_origin(source: Box<dyn DataSource>) -> BptfResult<Self> {
        let offsets = vec![0; source.nmodes()];
        Self::new(source, offsets)
    }

    pub fn source(&self) -> &dyn DataSource {
        self.source.as_ref()
    }

    pub fn noise(&self) -> &NoiseModel {
        &self.noise
    }

    pub fn noise_mut(&mut self) -> &mut NoiseModel {
        &mut self.noise
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn nmodes(&self) -> usize {
        self.offsets.len()
    }

    /// One past the last model entity this block touches in `mode`
    pub fn extent(&self, mode: usize) -> usize {
        self.offsets[mode] + self.source.dims()[mode]
    }

    /// Local index of model entity `entity` along `mode`, if covered
    pub fn local_entity(&self, mode: usize, entity: usize) -> Option<usize> {
        let start = self.offsets[mode];
        (entity >= start && entity < self.extent(mode)).then(|| entity - start)
    }

    pub fn init_noise(&mut self) -> BptfResult<()> {
        self.noise.init(self.source.as_ref())
    }

    fn factor_slices<'a>(&self, model: &'a Model) -> Vec<ArrayView2<'a, f64>> {
        (0..self.nmodes())
            .map(|m| {
                model
                    .factor(m)
                    .slice(s![.., self.offsets[m]..self.extent(m)])
            })
            .collect()
    }

    /// Squared-error statistics of the current model over observed cells
    ///
    /// Implicit zeros of a non-scarce sparse source are folded in through
    /// `Σ_cells ŷ² = sum(⊙_m U_m U_mᵀ)` instead of visiting every cell.
    pub fn residuals(&self, model: &Model) -> Residuals {
        let data = self.source.as_ref();
        let mut sse = 0.0;
        for (coords, value) in data.iter() {
            let pred = model.predict_at(coords, Some(self.offsets.as_slice()));
            sse += (value - pred) * (value - pred);
            if data.is_fully_observed() && !data.is_dense() {
                sse -= pred * pred;
            }
        }
        if data.is_fully_observed() && !data.is_dense() {
            sse += hadamard_gram_except(&self.factor_slices(model), usize::MAX).sum();
            sse = sse.max(0.0);
        }
        Residuals {
            sse,
            count: data.nobserved(),
        }
    }

    /// Resample the noise precision from the current residuals
    pub fn update_noise(&mut self, model: &Model, rng: &mut SamplerRng) -> BptfResult<()> {
        let residuals = self.residuals(model);
        self.noise.update(&residuals, rng)
    }

    /// Precomputed `α ⊙_{m ≠ mode} U_m U_mᵀ` for fully observed blocks with
    /// a constant precision; `None` when entities must be visited one
    /// observation at a time
    pub fn precision_shortcut(&self, model: &Model, mode: usize) -> Option<Array2<f64>> {
        if !self.source.is_fully_observed() || !self.noise.has_constant_alpha() {
            return None;
        }
        let mut g = hadamard_gram_except(&self.factor_slices(model), mode);
        g *= self.noise.get_alpha();
        Some(g)
    }

    /// Add this block's contribution for model entity `entity` of `mode`
    pub fn accumulate(
        &self,
        model: &Model,
        mode: usize,
        entity: usize,
        shortcut: Option<&Array2<f64>>,
        stats: &mut EntityStats,
        rng: &mut SamplerRng,
    ) {
        let Some(local) = self.local_entity(mode, entity) else {
            return;
        };
        if let Some(g) = shortcut {
            stats.precision += g;
        }
        let current = model.col(mode, entity);
        for &idx in self.source.entity_entries(mode, local) {
            let coords = self.source.coords(idx);
            let v = model.neighbour_vector(mode, coords, &self.offsets);
            let prediction = if self.noise.is_probit() {
                current.dot(&v)
            } else {
                0.0
            };
            let (alpha, y) = self
                .noise
                .observation(prediction, self.source.value(idx), rng);
            if shortcut.is_none() {
                add_outer(&mut stats.precision, &v.view(), alpha);
            }
            stats.rhs.scaled_add(alpha * y, &v);
        }
    }
}

/// Model mode sizes implied by a set of blocks
pub fn mode_sizes(blocks: &[DataBlock]) -> BptfResult<Vec<usize>> {
    let nmodes = blocks
        .first()
        .map(DataBlock::nmodes)
        .ok_or_else(|| BptfError::configuration("no training data"))?;
    if blocks.iter().any(|b| b.nmodes() != nmodes) {
        return Err(BptfError::configuration(
            "all data blocks must have the same number of modes",
        ));
    }
    Ok((0..nmodes)
        .map(|m| blocks.iter().map(|b| b.extent(m)).max().unwrap_or(0))
        .collect())
}
