//! Latent priors: per-mode Gibbs update rules
//!
//! Every mode of the model owns one prior. A sweep over mode `m` runs in two
//! phases:
//!
//! 1. **Entities** (parallel): for each entity the likelihood statistics
//!    `Σ α v vᵀ` and `Σ α y v` are gathered from every data block and the
//!    prior draws a new latent column. Columns are written back only after
//!    all entities are done.
//! 2. **Hyperparameters** (sequential): the prior redraws its own
//!    parameters from the updated factor matrix.
//!
//! | kind           | entity update             | hyperparameters                    |
//! |----------------|---------------------------|------------------------------------|
//! | `Normal`       | joint Gaussian            | Normal-Wishart `(μ, Λ)`            |
//! | `NormalOne`    | one dimension at a time   | Normal-Wishart `(μ, Λ)`            |
//! | `SpikeAndSlab` | per-dimension inclusion   | inclusion rate `r`, slab precision |
//! | `Macau`        | joint, mean `μ + βᵀf`     | `β` by ridge, `(μ, Λ)`, `λβ`       |
//! | `MacauOne`     | scalar, mean `μ + βᵀf`    | per-dimension `β`, `μ`, `Λ`, `λβ`  |

mod macau;
mod macau_one;
mod normal;
mod normal_one;
mod spike_slab;

pub use macau::MacauPrior;
pub use macau_one::MacauOnePrior;
pub use normal::NormalPrior;
pub use normal_one::NormalOnePrior;
pub use spike_slab::SpikeAndSlabPrior;

use crate::block::{DataBlock, EntityStats};
use crate::model::{MatrixRecord, Model};
use crate::pool::WorkerPool;
use crate::side_info::SideInfo;
use bptf_core::linalg::{chol_solve, cholesky_lower, solve_lower_transpose};
use bptf_core::{BptfError, BptfResult, SamplerRng};
use scirs2_core::ndarray_ext::{Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Which prior a mode uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorKind {
    Normal,
    NormalOne,
    SpikeAndSlab,
    Macau,
    MacauOne,
    /// `Macau` when the mode has side information, `Normal` otherwise
    #[default]
    Default,
}

impl fmt::Display for PriorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "normal",
            Self::NormalOne => "normalone",
            Self::SpikeAndSlab => "spikeandslab",
            Self::Macau => "macau",
            Self::MacauOne => "macauone",
            Self::Default => "default",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for PriorKind {
    type Err = BptfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "normalone" => Ok(Self::NormalOne),
            "spikeandslab" => Ok(Self::SpikeAndSlab),
            "macau" => Ok(Self::Macau),
            "macauone" => Ok(Self::MacauOne),
            "default" => Ok(Self::Default),
            other => Err(BptfError::configuration(format!("unknown prior '{}'", other))),
        }
    }
}

/// Saved hyperparameters of one prior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PriorState {
    Normal {
        mu: Vec<f64>,
        lambda: MatrixRecord,
    },
    NormalOne {
        mu: Vec<f64>,
        lambda: MatrixRecord,
    },
    SpikeAndSlab {
        r: Vec<f64>,
        alpha: Vec<f64>,
    },
    /// The link matrix itself travels with the model
    Macau {
        mu: Vec<f64>,
        lambda: MatrixRecord,
        lambda_beta: f64,
    },
    MacauOne {
        mu: Vec<f64>,
        lambda: Vec<f64>,
        lambda_beta: Vec<f64>,
    },
}

impl PriorState {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Normal { .. } => "normal",
            Self::NormalOne { .. } => "normalone",
            Self::SpikeAndSlab { .. } => "spikeandslab",
            Self::Macau { .. } => "macau",
            Self::MacauOne { .. } => "macauone",
        }
    }
}

/// Update rule of one mode
pub trait SamplePrior: Send + Sync {
    /// Mode this prior updates
    fn mode(&self) -> usize;

    fn name(&self) -> &'static str;

    /// One-time setup once the model exists (link matrices, side-info checks)
    fn init(&mut self, model: &mut Model, rng: &mut SamplerRng) -> BptfResult<()>;

    /// Draw a new latent column for `entity` given its likelihood statistics
    fn sample_entity(
        &self,
        entity: usize,
        model: &Model,
        stats: &EntityStats,
        rng: &mut SamplerRng,
    ) -> BptfResult<Array1<f64>>;

    /// Redraw hyperparameters from the updated factor matrix
    fn sample_hyper(&mut self, model: &mut Model, rng: &mut SamplerRng) -> BptfResult<()>;

    /// One-line diagnostic
    fn status(&self) -> String;

    fn save(&self) -> PriorState;

    /// Load hyperparameters saved by [`SamplePrior::save`]; the model must
    /// already be restored
    fn restore(&mut self, state: &PriorState, model: &Model) -> BptfResult<()>;
}

/// Closed set of priors
#[derive(Debug, Clone)]
pub enum LatentPrior {
    Normal(NormalPrior),
    NormalOne(NormalOnePrior),
    SpikeAndSlab(SpikeAndSlabPrior),
    Macau(Box<MacauPrior>),
    MacauOne(Box<MacauOnePrior>),
}

macro_rules! dispatch {
    ($self:expr, $p:ident => $body:expr) => {
        match $self {
            LatentPrior::Normal($p) => $body,
            LatentPrior::NormalOne($p) => $body,
            LatentPrior::SpikeAndSlab($p) => $body,
            LatentPrior::Macau($p) => $body,
            LatentPrior::MacauOne($p) => $body,
        }
    };
}

impl LatentPrior {
    /// Build the prior for `mode`
    ///
    /// # Errors
    ///
    /// [`BptfError::Configuration`] when a side-information prior has no
    /// side information, or side information is given to a prior that
    /// cannot use it.
    pub fn build(
        kind: PriorKind,
        mode: usize,
        num_latent: usize,
        side_info: Option<SideInfo>,
    ) -> BptfResult<Self> {
        let kind = match (kind, side_info.is_some()) {
            (PriorKind::Default, true) => PriorKind::Macau,
            (PriorKind::Default, false) => PriorKind::Normal,
            (k, _) => k,
        };
        match (kind, side_info) {
            (PriorKind::Macau, Some(si)) => Ok(Self::Macau(Box::new(MacauPrior::new(
                mode, num_latent, si,
            )))),
            (PriorKind::MacauOne, Some(si)) => Ok(Self::MacauOne(Box::new(
                MacauOnePrior::new(mode, num_latent, si),
            ))),
            (PriorKind::Macau | PriorKind::MacauOne, None) => Err(BptfError::configuration(
                format!("{} prior on mode {} needs side information", kind, mode),
            )),
            (_, Some(_)) => Err(BptfError::configuration(format!(
                "{} prior on mode {} cannot use side information",
                kind, mode
            ))),
            (PriorKind::Normal | PriorKind::Default, None) => {
                Ok(Self::Normal(NormalPrior::new(mode, num_latent)))
            }
            (PriorKind::NormalOne, None) => {
                Ok(Self::NormalOne(NormalOnePrior::new(mode, num_latent)))
            }
            (PriorKind::SpikeAndSlab, None) => Ok(Self::SpikeAndSlab(SpikeAndSlabPrior::new(
                mode, num_latent,
            ))),
        }
    }

    pub fn kind(&self) -> PriorKind {
        match self {
            Self::Normal(_) => PriorKind::Normal,
            Self::NormalOne(_) => PriorKind::NormalOne,
            Self::SpikeAndSlab(_) => PriorKind::SpikeAndSlab,
            Self::Macau(_) => PriorKind::Macau,
            Self::MacauOne(_) => PriorKind::MacauOne,
        }
    }
}

impl SamplePrior for LatentPrior {
    fn mode(&self) -> usize {
        dispatch!(self, p => p.mode())
    }

    fn name(&self) -> &'static str {
        dispatch!(self, p => p.name())
    }

    fn init(&mut self, model: &mut Model, rng: &mut SamplerRng) -> BptfResult<()> {
        dispatch!(self, p => p.init(model, rng))
    }

    fn sample_entity(
        &self,
        entity: usize,
        model: &Model,
        stats: &EntityStats,
        rng: &mut SamplerRng,
    ) -> BptfResult<Array1<f64>> {
        dispatch!(self, p => p.sample_entity(entity, model, stats, rng))
    }

    fn sample_hyper(&mut self, model: &mut Model, rng: &mut SamplerRng) -> BptfResult<()> {
        dispatch!(self, p => p.sample_hyper(model, rng))
    }

    fn status(&self) -> String {
        dispatch!(self, p => p.status())
    }

    fn save(&self) -> PriorState {
        dispatch!(self, p => p.save())
    }

    fn restore(&mut self, state: &PriorState, model: &Model) -> BptfResult<()> {
        dispatch!(self, p => p.restore(state, model))
    }
}

/// One Gibbs sweep over the mode of `prior`
pub fn update_mode(
    prior: &mut LatentPrior,
    model: &mut Model,
    blocks: &[DataBlock],
    pool: &mut WorkerPool,
) -> BptfResult<()> {
    let mode = prior.mode();
    let num_latent = model.num_latent();
    let nentities = model.factor(mode).ncols();
    let shortcuts: Vec<Option<Array2<f64>>> = blocks
        .iter()
        .map(|b| b.precision_shortcut(model, mode))
        .collect();

    let columns = {
        let prior: &LatentPrior = prior;
        let model: &Model = model;
        pool.map_ranges(nentities, |range, rng| {
            range
                .map(|entity| {
                    let mut stats = EntityStats::new(num_latent);
                    for (block, shortcut) in blocks.iter().zip(shortcuts.iter()) {
                        block.accumulate(model, mode, entity, shortcut.as_ref(), &mut stats, rng);
                    }
                    prior.sample_entity(entity, model, &stats, rng)
                })
                .collect()
        })?
    };

    let factor = model.factor_mut(mode);
    for (entity, column) in columns.into_iter().enumerate() {
        factor.column_mut(entity).assign(&column);
    }

    prior.sample_hyper(model, pool.master_rng())?;
    debug!(mode, prior = prior.name(), "mode updated");
    Ok(())
}

/// Draw from `N(P⁻¹ h, P⁻¹)` with one Cholesky factorization of `P`
pub(crate) fn sample_gaussian_canonical(
    precision: &ArrayView2<f64>,
    h: &ArrayView1<f64>,
    rng: &mut SamplerRng,
) -> BptfResult<Array1<f64>> {
    let l = cholesky_lower(precision)?;
    let mean = chol_solve(&l.view(), h)?;
    let z = rng.normal_vec(h.len());
    Ok(mean + solve_lower_transpose(&l.view(), &z.view())?)
}

/// Resample `u` one coordinate at a time from `N(P⁻¹ h, P⁻¹)`
///
/// Coordinate `d` is drawn from its scalar conditional with precision
/// `P_dd` and mean `(h_d − Σ_{j≠d} P_dj u_j) / P_dd`, using the already
/// updated coordinates.
pub(crate) fn sample_gaussian_by_coordinate(
    u: &mut Array1<f64>,
    precision: &ArrayView2<f64>,
    h: &ArrayView1<f64>,
    rng: &mut SamplerRng,
) -> BptfResult<()> {
    for d in 0..u.len() {
        let p = precision[[d, d]];
        if !(p.is_finite() && p > 0.0) {
            return Err(BptfError::numerical(format!(
                "non-positive conditional precision {} in dimension {}",
                p, d
            )));
        }
        let cross = precision.row(d).dot(u) - p * u[d];
        let mean = (h[d] - cross) / p;
        u[d] = mean + rng.normal() / p.sqrt();
    }
    Ok(())
}

/// Rows drawn from `N(0, Λ⁻¹)` given the lower Cholesky factor of `Λ`
pub(crate) fn sample_rows_with_precision(
    nrows: usize,
    lambda_chol: &ArrayView2<f64>,
    rng: &mut SamplerRng,
) -> BptfResult<Array2<f64>> {
    let d = lambda_chol.nrows();
    let mut out = Array2::<f64>::zeros((nrows, d));
    for mut row in out.rows_mut() {
        let z = rng.normal_vec(d);
        row.assign(&solve_lower_transpose(lambda_chol, &z.view())?);
    }
    Ok(out)
}

pub(crate) fn expect_dim(what: &str, got: usize, want: usize) -> BptfResult<()> {
    if got != want {
        return Err(BptfError::configuration(format!(
            "saved {} has dimension {} but the model uses {}",
            what, got, want
        )));
    }
    Ok(())
}

pub(crate) fn mismatched_state(expected: &str, state: &PriorState) -> BptfError {
    BptfError::configuration(format!(
        "checkpoint holds a {} prior state where a {} prior is configured",
        state.kind_name(),
        expected
    ))
}
