//! Observation data consumed by the sampler
//!
//! The sampler only needs typed, in-memory observations: a list of
//! (coordinate, value) pairs over K modes plus a few flags describing how
//! absent cells are interpreted. [`DataSource`] is the capability the engine
//! consumes; [`ObservationSet`] is the provided implementation.
//!
//! # Kinds
//!
//! - [`DataKind::Dense`]: every cell is present in the set
//! - [`DataKind::Sparse`] with `scarce = true`: absent cells are unknown
//! - [`DataKind::Sparse`] with `scarce = false`: absent cells are observed zeros
//!
//! Dense and non-scarce sparse data are *fully observed*; for those the
//! sampler can use Gram-matrix shortcuts.
//!
//! # Examples
//!
//! ```
//! use bptf_core::data::{DataSource, ObservationSet};
//!
//! let obs = ObservationSet::sparse(
//!     vec![3, 4],
//!     vec![(vec![0, 1], 5.0), (vec![2, 3], 12.0)],
//! ).unwrap();
//!
//! assert_eq!(obs.nnz(), 2);
//! assert_eq!(obs.entity_entries(1, 3), &[1]);
//! ```

use crate::error::{BptfError, BptfResult};
use crate::noise_config::NoiseConfig;
use scirs2_core::ndarray_ext::ArrayView2;

/// How cells absent from the observation list are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    /// Every cell is listed
    Dense,
    /// Only some cells are listed
    Sparse {
        /// `true`: absent cells are unknown; `false`: absent cells are zeros
        scarce: bool,
    },
}

/// Typed observations over K modes
pub trait DataSource: Send + Sync {
    /// Size of each mode
    fn dims(&self) -> &[usize];

    /// Number of listed observations
    fn nnz(&self) -> usize;

    fn kind(&self) -> DataKind;

    /// All values are 0 or 1
    fn is_binary(&self) -> bool;

    /// Coordinates of the `idx`-th observation
    fn coords(&self, idx: usize) -> &[usize];

    /// Value of the `idx`-th observation
    fn value(&self, idx: usize) -> f64;

    /// Observation ids touching `entity` along `mode`
    fn entity_entries(&self, mode: usize, entity: usize) -> &[usize];

    /// Noise model requested for this source
    fn noise_config(&self) -> NoiseConfig;

    fn nmodes(&self) -> usize {
        self.dims().len()
    }

    fn is_dense(&self) -> bool {
        matches!(self.kind(), DataKind::Dense)
    }

    fn is_scarce(&self) -> bool {
        matches!(self.kind(), DataKind::Sparse { scarce: true })
    }

    /// Every cell carries a value, either listed or implicit zero
    fn is_fully_observed(&self) -> bool {
        !self.is_scarce()
    }

    /// Total number of cells
    fn ncells(&self) -> usize {
        self.dims().iter().product()
    }

    /// Number of cells that count as observed
    fn nobserved(&self) -> usize {
        if self.is_fully_observed() {
            self.ncells()
        } else {
            self.nnz()
        }
    }

    /// Lazy sequence of (coords, value)
    fn iter(&self) -> Box<dyn Iterator<Item = (&[usize], f64)> + '_> {
        Box::new((0..self.nnz()).map(move |i| (self.coords(i), self.value(i))))
    }

    /// Mean and (population) variance over all observed cells
    fn value_moments(&self) -> (f64, f64) {
        let n = self.nobserved();
        if n == 0 {
            return (0.0, 0.0);
        }
        let (sum, sumsq) = (0..self.nnz())
            .map(|i| self.value(i))
            .fold((0.0, 0.0), |(s, ss), v| (s + v, ss + v * v));
        let mean = sum / n as f64;
        (mean, (sumsq / n as f64 - mean * mean).max(0.0))
    }
}

/// Per-mode index from entity to observation ids
#[derive(Debug, Clone)]
struct EntityIndex {
    offsets: Vec<usize>,
    entries: Vec<usize>,
}

impl EntityIndex {
    fn build(dims: &[usize], coords: &[usize], mode: usize) -> Self {
        let nmodes = dims.len();
        let nnz = coords.len() / nmodes.max(1);
        let mut offsets = vec![0usize; dims[mode] + 1];
        for i in 0..nnz {
            offsets[coords[i * nmodes + mode] + 1] += 1;
        }
        for e in 0..dims[mode] {
            offsets[e + 1] += offsets[e];
        }
        let mut cursor = offsets.clone();
        let mut entries = vec![0usize; nnz];
        for i in 0..nnz {
            let e = coords[i * nmodes + mode];
            entries[cursor[e]] = i;
            cursor[e] += 1;
        }
        Self { offsets, entries }
    }

    fn entries(&self, entity: usize) -> &[usize] {
        match (self.offsets.get(entity), self.offsets.get(entity + 1)) {
            (Some(&start), Some(&end)) => &self.entries[start..end],
            _ => &[],
        }
    }
}

/// In-memory observation set
#[derive(Debug, Clone)]
pub struct ObservationSet {
    dims: Vec<usize>,
    /// Flattened coordinates, `nmodes` per observation
    coords: Vec<usize>,
    values: Vec<f64>,
    kind: DataKind,
    binary: bool,
    noise: NoiseConfig,
    index: Vec<EntityIndex>,
}

impl ObservationSet {
    /// Build a scarce sparse set from (coords, value) pairs
    ///
    /// # Errors
    ///
    /// Returns [`BptfError::Data`] if a coordinate has the wrong number of
    /// modes, is out of bounds, or a value is not finite.
    pub fn sparse<I>(dims: Vec<usize>, entries: I) -> BptfResult<Self>
    where
        I: IntoIterator<Item = (Vec<usize>, f64)>,
    {
        let mut coords = Vec::new();
        let mut values = Vec::new();
        for (c, v) in entries {
            if c.len() != dims.len() {
                return Err(BptfError::data(format!(
                    "coordinate {:?} has {} modes, expected {}",
                    c,
                    c.len(),
                    dims.len()
                )));
            }
            coords.extend_from_slice(&c);
            values.push(v);
        }
        Self::from_flat(dims, coords, values, DataKind::Sparse { scarce: true })
    }

    /// Build a dense set from row-major values
    pub fn dense(dims: Vec<usize>, values: Vec<f64>) -> BptfResult<Self> {
        let ncells: usize = dims.iter().product();
        if values.len() != ncells {
            return Err(BptfError::data(format!(
                "dense data of shape {:?} needs {} values, got {}",
                dims,
                ncells,
                values.len()
            )));
        }
        let nmodes = dims.len();
        let mut coords = Vec::with_capacity(ncells * nmodes);
        let mut current = vec![0usize; nmodes];
        for _ in 0..ncells {
            coords.extend_from_slice(&current);
            for m in (0..nmodes).rev() {
                current[m] += 1;
                if current[m] < dims[m] {
                    break;
                }
                current[m] = 0;
            }
        }
        Self::from_flat(dims, coords, values, DataKind::Dense)
    }

    /// Build a dense two-mode set from a matrix
    pub fn from_dense_matrix(matrix: &ArrayView2<f64>) -> BptfResult<Self> {
        let (rows, cols) = matrix.dim();
        Self::dense(vec![rows, cols], matrix.iter().copied().collect())
    }

    fn from_flat(
        dims: Vec<usize>,
        coords: Vec<usize>,
        values: Vec<f64>,
        kind: DataKind,
    ) -> BptfResult<Self> {
        if dims.is_empty() {
            return Err(BptfError::data("observation set needs at least one mode"));
        }
        if dims.contains(&0) {
            return Err(BptfError::data(format!(
                "mode sizes must be positive, got {:?}",
                dims
            )));
        }
        let nmodes = dims.len();
        for (i, c) in coords.chunks(nmodes).enumerate() {
            for (m, (&idx, &size)) in c.iter().zip(dims.iter()).enumerate() {
                if idx >= size {
                    return Err(BptfError::data(format!(
                        "observation {} has index {} in mode {} of size {}",
                        i, idx, m, size
                    )));
                }
            }
        }
        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(BptfError::data(format!(
                "observation {} has non-finite value {}",
                pos, values[pos]
            )));
        }

        let binary = !values.is_empty() && values.iter().all(|&v| v == 0.0 || v == 1.0);
        let index = (0..nmodes)
            .map(|m| EntityIndex::build(&dims, &coords, m))
            .collect();

        Ok(Self {
            dims,
            coords,
            values,
            kind,
            binary,
            noise: NoiseConfig::default(),
            index,
        })
    }

    /// Interpret absent cells as observed zeros
    pub fn with_implicit_zeros(mut self) -> Self {
        if let DataKind::Sparse { .. } = self.kind {
            self.kind = DataKind::Sparse { scarce: false };
        }
        self
    }

    pub fn with_noise(mut self, noise: NoiseConfig) -> Self {
        self.noise = noise;
        self
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

impl DataSource for ObservationSet {
    fn dims(&self) -> &[usize] {
        &self.dims
    }

    fn nnz(&self) -> usize {
        self.values.len()
    }

    fn kind(&self) -> DataKind {
        self.kind
    }

    fn is_binary(&self) -> bool {
        self.binary
    }

    fn coords(&self, idx: usize) -> &[usize] {
        let k = self.dims.len();
        &self.coords[idx * k..(idx + 1) * k]
    }

    fn value(&self, idx: usize) -> f64 {
        self.values[idx]
    }

    fn entity_entries(&self, mode: usize, entity: usize) -> &[usize] {
        self.index
            .get(mode)
            .map(|ix| ix.entries(entity))
            .unwrap_or(&[])
    }

    fn noise_config(&self) -> NoiseConfig {
        self.noise
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scirs2_core::ndarray_ext::array;

    #[test]
    fn test_dense_from_matrix() {
        let m = array![[1.0, 5.0, 9.0, 2.0], [6.0, 10.0, 3.0, 7.0], [11.0, 4.0, 8.0, 12.0]];
        let obs = ObservationSet::from_dense_matrix(&m.view()).unwrap();
        assert!(obs.is_dense());
        assert!(obs.is_fully_observed());
        assert_eq!(obs.nnz(), 12);
        assert_eq!(obs.dims(), &[3, 4]);
        assert_eq!(obs.coords(5), &[1, 1]);
        assert_eq!(obs.value(5), 10.0);
        assert_eq!(obs.entity_entries(0, 2).len(), 4);
        assert_eq!(obs.entity_entries(1, 0), &[0, 4, 8]);
    }

    #[test]
    fn test_sparse_index() {
        let obs = ObservationSet::sparse(
            vec![2, 3, 2],
            vec![
                (vec![0, 0, 1], 1.0),
                (vec![1, 2, 0], 2.0),
                (vec![0, 2, 1], 3.0),
            ],
        )
        .unwrap();
        assert!(obs.is_scarce());
        assert_eq!(obs.entity_entries(0, 0), &[0, 2]);
        assert_eq!(obs.entity_entries(1, 2), &[1, 2]);
        assert_eq!(obs.entity_entries(1, 1), &[] as &[usize]);
        assert_eq!(obs.entity_entries(2, 1), &[0, 2]);
        assert_eq!(obs.entity_entries(7, 0), &[] as &[usize]);
        assert_eq!(obs.iter().count(), 3);
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let err = ObservationSet::sparse(vec![2, 2], vec![(vec![0, 2], 1.0)]).unwrap_err();
        assert!(matches!(err, BptfError::Data(_)));

        let err = ObservationSet::sparse(vec![2, 2], vec![(vec![0], 1.0)]).unwrap_err();
        assert!(matches!(err, BptfError::Data(_)));

        let err = ObservationSet::sparse(vec![2, 2], vec![(vec![0, 0], f64::NAN)]).unwrap_err();
        assert!(matches!(err, BptfError::Data(_)));
    }

    #[test]
    fn test_binary_and_moments() {
        let obs = ObservationSet::sparse(
            vec![2, 2],
            vec![(vec![0, 0], 1.0), (vec![1, 1], 0.0)],
        )
        .unwrap();
        assert!(obs.is_binary());
        let (mean, var) = obs.value_moments();
        assert!((mean - 0.5).abs() < 1e-12);
        assert!((var - 0.25).abs() < 1e-12);

        // Implicit zeros count towards the moments
        let zeros = obs.clone().with_implicit_zeros();
        assert!(zeros.is_fully_observed());
        let (mean, _) = zeros.value_moments();
        assert!((mean - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_dense_shape_mismatch() {
        assert!(ObservationSet::dense(vec![2, 2], vec![1.0; 3]).is_err());
        let obs = ObservationSet::dense(vec![2, 2, 2], (0..8).map(f64::from).collect()).unwrap();
        assert_eq!(obs.coords(7), &[1, 1, 1]);
        assert_eq!(obs.coords(2), &[0, 1, 0]);
    }
}
