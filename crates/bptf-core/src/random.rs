//! Random-number context for Gibbs sampling
//!
//! There is no ambient generator: every draw takes a `&mut SamplerRng`. The
//! worker pool owns one instance per worker, seeded from the master seed
//! offset by the worker index (see [`SamplerRng::for_worker`]), so streams
//! are never shared between threads.
//!
//! Uniform, standard-normal, Gamma and Beta variates come from the
//! `scirs2_core::random` distributions; truncated normals are built on top
//! of them.

use crate::error::{BptfError, BptfResult};
use scirs2_core::ndarray_ext::Array1;
use scirs2_core::random::{RandBeta, RandGamma, Rng, SeedableRng, StdRng};
use scirs2_core::StandardNormal;
use std::fmt;

/// Seed offset between consecutive workers
pub const WORKER_SEED_STRIDE: u64 = 1999;

/// Seedable generator with the distributions the sampler needs
#[derive(Clone)]
pub struct SamplerRng {
    rng: StdRng,
}

impl fmt::Debug for SamplerRng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplerRng").finish_non_exhaustive()
    }
}

impl SamplerRng {
    pub fn seed_from(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Generator for worker `worker` under master seed `seed`
    pub fn for_worker(seed: u64, worker: usize) -> Self {
        Self::seed_from(worker_seed(seed, worker))
    }

    /// Uniform on `[0, 1)`
    pub fn uniform(&mut self) -> f64 {
        self.rng.random::<f64>()
    }

    /// Uniform on `(0, 1]`, safe to take a logarithm of
    pub fn uniform_open(&mut self) -> f64 {
        1.0 - self.uniform()
    }

    /// Standard normal
    pub fn normal(&mut self) -> f64 {
        self.rng.sample(StandardNormal)
    }

    /// Vector of `n` independent standard normals
    pub fn normal_vec(&mut self, n: usize) -> Array1<f64> {
        Array1::from_shape_fn(n, |_| self.normal())
    }

    /// `Gamma(shape, scale)`
    ///
    /// # Errors
    ///
    /// [`BptfError::Numerical`] if the shape or scale is not positive and
    /// finite; these come from degenerate posterior parameters.
    pub fn gamma(&mut self, shape: f64, scale: f64) -> BptfResult<f64> {
        if !scale.is_finite() {
            return Err(BptfError::numerical(format!(
                "Gamma({}, {}) has a non-finite scale",
                shape, scale
            )));
        }
        let dist = RandGamma::new(shape, scale).map_err(|e| {
            BptfError::numerical(format!("Gamma({}, {}) is not a valid draw: {}", shape, scale, e))
        })?;
        Ok(self.rng.sample(dist))
    }

    /// `Gamma(shape, rate)`, the parameterization used by conjugate updates
    pub fn gamma_rate(&mut self, shape: f64, rate: f64) -> BptfResult<f64> {
        self.gamma(shape, 1.0 / rate)
    }

    /// `Beta(a, b)`
    pub fn beta(&mut self, a: f64, b: f64) -> BptfResult<f64> {
        let dist = RandBeta::new(a, b).map_err(|e| {
            BptfError::numerical(format!("Beta({}, {}) is not a valid draw: {}", a, b, e))
        })?;
        Ok(self.rng.sample(dist))
    }

    pub fn bernoulli(&mut self, p: f64) -> bool {
        self.uniform() < p
    }

    /// Unit-variance normal centred on `mean`, truncated to `(0, ∞)`
    ///
    /// Uses plain rejection when the bound is below the mean and Robert's
    /// exponential proposal in the tail.
    pub fn truncated_normal_positive(&mut self, mean: f64) -> f64 {
        // x = z - mean ~ N(0, 1) restricted to x > lower
        let lower = -mean;
        if lower <= 0.0 {
            loop {
                let x = self.normal();
                if x > lower {
                    return mean + x;
                }
            }
        }
        let alpha = 0.5 * (lower + (lower * lower + 4.0).sqrt());
        loop {
            let x = lower - self.uniform_open().ln() / alpha;
            let rho = (-0.5 * (x - alpha) * (x - alpha)).exp();
            if self.uniform() <= rho {
                return mean + x;
            }
        }
    }

    /// Unit-variance normal centred on `mean`, truncated to `(-∞, 0)`
    pub fn truncated_normal_negative(&mut self, mean: f64) -> f64 {
        -self.truncated_normal_positive(-mean)
    }
}

/// Seed for worker `worker`: `seed + worker · 1999`
pub fn worker_seed(seed: u64, worker: usize) -> u64 {
    seed.wrapping_add((worker as u64).wrapping_mul(WORKER_SEED_STRIDE))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mean_var(xs: &[f64]) -> (f64, f64) {
        let n = xs.len() as f64;
        let m = xs.iter().sum::<f64>() / n;
        let v = xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (n - 1.0);
        (m, v)
    }

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = SamplerRng::seed_from(42);
        let mut b = SamplerRng::seed_from(42);
        for _ in 0..100 {
            assert_eq!(a.normal(), b.normal());
        }
    }

    #[test]
    fn test_worker_seeds_differ() {
        assert_eq!(worker_seed(1234, 0), 1234);
        assert_eq!(worker_seed(1234, 2), 1234 + 2 * 1999);
        let mut w0 = SamplerRng::for_worker(7, 0);
        let mut w1 = SamplerRng::for_worker(7, 1);
        let s0: Vec<f64> = (0..10).map(|_| w0.uniform()).collect();
        let s1: Vec<f64> = (0..10).map(|_| w1.uniform()).collect();
        assert_ne!(s0, s1);
    }

    #[test]
    fn test_gamma_moments() {
        let mut rng = SamplerRng::seed_from(1);
        for &(shape, scale) in &[(0.5, 2.0), (3.0, 0.5), (10.0, 1.0)] {
            let xs: Vec<f64> = (0..20_000).map(|_| rng.gamma(shape, scale).unwrap()).collect();
            assert!(xs.iter().all(|&x| x > 0.0));
            let (m, v) = mean_var(&xs);
            let (em, ev) = (shape * scale, shape * scale * scale);
            assert!((m - em).abs() < 0.05 * em + 0.02, "mean {} vs {}", m, em);
            assert!((v - ev).abs() < 0.1 * ev + 0.02, "var {} vs {}", v, ev);
        }
    }

    #[test]
    fn test_beta_in_unit_interval() {
        let mut rng = SamplerRng::seed_from(3);
        let xs: Vec<f64> = (0..10_000).map(|_| rng.beta(2.0, 5.0).unwrap()).collect();
        assert!(xs.iter().all(|&x| (0.0..=1.0).contains(&x)));
        let (m, _) = mean_var(&xs);
        assert!((m - 2.0 / 7.0).abs() < 0.02);
    }

    #[test]
    fn test_gamma_rejects_degenerate_parameters() {
        let mut rng = SamplerRng::seed_from(4);
        assert!(rng.gamma(0.0, 1.0).unwrap_err().is_numerical());
        assert!(rng.gamma(2.0, -1.0).unwrap_err().is_numerical());
        assert!(rng.gamma_rate(2.0, 0.0).unwrap_err().is_numerical());
        assert!(rng.beta(f64::NAN, 1.0).unwrap_err().is_numerical());
    }

    #[test]
    fn test_truncated_normal_bounds() {
        let mut rng = SamplerRng::seed_from(9);
        for &mean in &[-4.0, -0.5, 0.0, 0.7, 3.0] {
            for _ in 0..2_000 {
                assert!(rng.truncated_normal_positive(mean) > 0.0);
                assert!(rng.truncated_normal_negative(mean) < 0.0);
            }
        }
    }

    #[test]
    fn test_truncated_normal_tail_mean() {
        // E[z | z > 0] for z ~ N(-3, 1) is about 0.283
        let mut rng = SamplerRng::seed_from(11);
        let xs: Vec<f64> = (0..20_000)
            .map(|_| rng.truncated_normal_positive(-3.0))
            .collect();
        let (m, _) = mean_var(&xs);
        assert!((m - 0.283).abs() < 0.02, "tail mean {}", m);
    }
}
