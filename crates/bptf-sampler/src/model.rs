//! Latent factor model
//!
//! One D × Nₘ factor matrix per mode (column `e` is the latent vector of
//! entity `e`) plus an optional link matrix per mode for side-information
//! priors. A prediction is the generalized dot product of one column from
//! every mode:
//!
//! ```text
//! ŷ(i₁, …, i_K) = Σ_d Π_m U_m[d, i_m]
//! ```
//!
//! Priors never hold references into the model; they carry a mode index and
//! resolve matrices through [`Model::factor`] / [`Model::link_matrix`] at
//! call time.

use bptf_core::{BptfError, BptfResult, SamplerRng};
use scirs2_core::ndarray_ext::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How factor matrices are initialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelInit {
    /// Independent standard normals
    #[default]
    Random,
    Zero,
}

impl fmt::Display for ModelInit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Random => write!(f, "random"),
            Self::Zero => write!(f, "zero"),
        }
    }
}

/// Side-information regression of one mode: `U ≈ βᵀFᵀ + μ`
#[derive(Debug, Clone, PartialEq)]
pub struct LinkMatrix {
    /// F × D regression coefficients
    pub beta: Array2<f64>,
    /// Shared prior mean (D)
    pub mu: Array1<f64>,
}

/// Row-major dense matrix in serializable form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixRecord {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl MatrixRecord {
    pub fn from_array(a: &Array2<f64>) -> Self {
        Self {
            rows: a.nrows(),
            cols: a.ncols(),
            data: a.iter().copied().collect(),
        }
    }

    pub fn to_array(&self) -> BptfResult<Array2<f64>> {
        Array2::from_shape_vec((self.rows, self.cols), self.data.clone()).map_err(|e| {
            BptfError::data(format!(
                "matrix record {}x{} with {} values: {}",
                self.rows,
                self.cols,
                self.data.len(),
                e
            ))
        })
    }
}

/// Serialized link matrix of one mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub mode: usize,
    pub beta: MatrixRecord,
    pub mu: Vec<f64>,
}

/// Serialized model: factors keyed by mode index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub num_latent: usize,
    pub factors: Vec<MatrixRecord>,
    pub links: Vec<LinkRecord>,
}

/// Current sample of all latent factors
#[derive(Debug, Clone)]
pub struct Model {
    num_latent: usize,
    factors: Vec<Array2<f64>>,
    links: Vec<Option<LinkMatrix>>,
}

impl Model {
    /// Create a model with `num_latent` rows per factor and one column per
    /// entity of each mode
    pub fn new(
        dims: &[usize],
        num_latent: usize,
        init: ModelInit,
        rng: &mut SamplerRng,
    ) -> BptfResult<Self> {
        if num_latent == 0 {
            return Err(BptfError::configuration("num_latent must be positive"));
        }
        if dims.is_empty() {
            return Err(BptfError::configuration("model needs at least one mode"));
        }
        let factors = dims
            .iter()
            .map(|&n| match init {
                ModelInit::Random => Array2::from_shape_fn((num_latent, n), |_| rng.normal()),
                ModelInit::Zero => Array2::zeros((num_latent, n)),
            })
            .collect();
        Ok(Self {
            num_latent,
            factors,
            links: vec![None; dims.len()],
        })
    }

    /// Build directly from factor matrices (all must have the same row count)
    pub fn from_factors(factors: Vec<Array2<f64>>) -> BptfResult<Self> {
        let num_latent = factors
            .first()
            .map(|f| f.nrows())
            .ok_or_else(|| BptfError::configuration("model needs at least one mode"))?;
        if num_latent == 0 || factors.iter().any(|f| f.nrows() != num_latent) {
            return Err(BptfError::configuration(
                "all factor matrices must share the same positive latent dimension",
            ));
        }
        let nmodes = factors.len();
        Ok(Self {
            num_latent,
            factors,
            links: vec![None; nmodes],
        })
    }

    pub fn num_latent(&self) -> usize {
        self.num_latent
    }

    pub fn nmodes(&self) -> usize {
        self.factors.len()
    }

    pub fn dims(&self) -> Vec<usize> {
        self.factors.iter().map(|f| f.ncols()).collect()
    }

    pub fn factor(&self, mode: usize) -> &Array2<f64> {
        &self.factors[mode]
    }

    pub fn factor_mut(&mut self, mode: usize) -> &mut Array2<f64> {
        &mut self.factors[mode]
    }

    pub fn factors(&self) -> &[Array2<f64>] {
        &self.factors
    }

    /// Latent vector of `entity` in `mode`
    pub fn col(&self, mode: usize, entity: usize) -> ArrayView1<'_, f64> {
        self.factors[mode].column(entity)
    }

    /// Predict the value at `coords` (one index per mode)
    pub fn predict(&self, coords: &[usize]) -> f64 {
        self.predict_at(coords, None)
    }

    /// Predict with optional per-mode offsets added to `coords`
    pub fn predict_at(&self, coords: &[usize], offsets: Option<&[usize]>) -> f64 {
        let mut acc = 0.0;
        for d in 0..self.num_latent {
            let mut prod = 1.0;
            for (m, &c) in coords.iter().enumerate() {
                let idx = c + offsets.map_or(0, |o| o[m]);
                prod *= self.factors[m][[d, idx]];
            }
            acc += prod;
        }
        acc
    }

    /// Hadamard product of the columns indexed by `coords` in every mode but
    /// `skip`
    pub fn neighbour_vector(
        &self,
        skip: usize,
        coords: &[usize],
        offsets: &[usize],
    ) -> Array1<f64> {
        let mut v = Array1::<f64>::ones(self.num_latent);
        for (m, &c) in coords.iter().enumerate() {
            if m == skip {
                continue;
            }
            v *= &self.factors[m].column(c + offsets[m]);
        }
        v
    }

    pub fn set_link_matrix(&mut self, mode: usize, beta: Array2<f64>, mu: Array1<f64>) {
        self.links[mode] = Some(LinkMatrix { beta, mu });
    }

    pub fn link_matrix(&self, mode: usize) -> Option<&LinkMatrix> {
        self.links.get(mode).and_then(|l| l.as_ref())
    }

    pub fn to_record(&self) -> ModelRecord {
        ModelRecord {
            num_latent: self.num_latent,
            factors: self.factors.iter().map(MatrixRecord::from_array).collect(),
            links: self
                .links
                .iter()
                .enumerate()
                .filter_map(|(mode, link)| {
                    link.as_ref().map(|l| LinkRecord {
                        mode,
                        beta: MatrixRecord::from_array(&l.beta),
                        mu: l.mu.to_vec(),
                    })
                })
                .collect(),
        }
    }

    pub fn from_record(record: &ModelRecord) -> BptfResult<Self> {
        let factors = record
            .factors
            .iter()
            .map(MatrixRecord::to_array)
            .collect::<BptfResult<Vec<_>>>()?;
        let mut model = Self::from_factors(factors)?;
        if model.num_latent != record.num_latent {
            return Err(BptfError::data(format!(
                "model record declares {} latent dimensions but factors have {}",
                record.num_latent, model.num_latent
            )));
        }
        for link in &record.links {
            if link.mode >= model.nmodes() {
                return Err(BptfError::data(format!(
                    "link matrix for mode {} in a {}-mode model",
                    link.mode,
                    model.nmodes()
                )));
            }
            let beta = link.beta.to_array()?;
            model.set_link_matrix(link.mode, beta, Array1::from_vec(link.mu.clone()));
        }
        Ok(model)
    }
}
