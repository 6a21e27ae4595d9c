//! Fixed-size worker pool with one random stream per worker
//!
//! Entities of a mode are split into contiguous ranges, one per worker.
//! Range `w` is always drawn with worker `w`'s generator, whichever OS
//! thread ends up running it, so a sweep is reproducible for a given seed
//! and worker count.

use bptf_core::{BptfError, BptfResult, SamplerRng};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::ops::Range;

/// Split `0..n` into `parts` contiguous ranges whose sizes differ by at most one
pub fn partition(n: usize, parts: usize) -> Vec<Range<usize>> {
    let parts = parts.max(1);
    let base = n / parts;
    let extra = n % parts;
    let mut start = 0;
    (0..parts)
        .map(|w| {
            let len = base + usize::from(w < extra);
            let range = start..start + len;
            start += len;
            range
        })
        .collect()
}

pub struct WorkerPool {
    pool: ThreadPool,
    rngs: Vec<SamplerRng>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.rngs.len())
            .finish()
    }
}

impl WorkerPool {
    /// Pool of `num_threads` workers (0 picks the available parallelism)
    pub fn new(num_threads: usize, seed: u64) -> BptfResult<Self> {
        let workers = if num_threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            num_threads
        };
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("bptf-worker-{}", i))
            .build()
            .map_err(|e| BptfError::configuration(format!("cannot build worker pool: {}", e)))?;
        Ok(Self {
            pool,
            rngs: Self::seeded(workers, seed),
        })
    }

    fn seeded(workers: usize, seed: u64) -> Vec<SamplerRng> {
        (0..workers)
            .map(|w| SamplerRng::for_worker(seed, w))
            .collect()
    }

    pub fn num_workers(&self) -> usize {
        self.rngs.len()
    }

    /// Replace every worker stream with a fresh one derived from `seed`
    pub fn reseed(&mut self, seed: u64) {
        self.rngs = Self::seeded(self.rngs.len(), seed);
    }

    /// Generator for sequential phases (hyperparameter and noise draws)
    pub fn master_rng(&mut self) -> &mut SamplerRng {
        &mut self.rngs[0]
    }

    /// Run `op` inside the pool
    pub fn install<R, OP>(&self, op: OP) -> R
    where
        R: Send,
        OP: FnOnce() -> R + Send,
    {
        self.pool.install(op)
    }

    /// Map every index of `0..n` through `f`, range by range, in parallel
    ///
    /// `f` receives a contiguous range and the generator of the worker that
    /// owns it, and returns one item per index. Results come back in index
    /// order; the first error aborts the whole map.
    pub fn map_ranges<T, F>(&mut self, n: usize, f: F) -> BptfResult<Vec<T>>
    where
        T: Send,
        F: Fn(Range<usize>, &mut SamplerRng) -> BptfResult<Vec<T>> + Sync,
    {
        let Self { pool, rngs } = self;
        let ranges = partition(n, rngs.len());
        let chunks: Vec<BptfResult<Vec<T>>> = pool.install(|| {
            ranges
                .into_par_iter()
                .zip(rngs.par_iter_mut())
                .map(|(range, rng)| f(range, rng))
                .collect()
        });
        let mut out = Vec::with_capacity(n);
        for chunk in chunks {
            out.extend(chunk?);
        }
        Ok(out)
    }
}
