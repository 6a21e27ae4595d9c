//! Benchmarks for the Gibbs sweep and its hot spots
//!
//! - one full sweep of a sparse matrix at several latent sizes
//! - thread scaling of the entity phase
//! - Direct vs Iterative ridge solves for side information

use bptf_core::{NoiseConfig, ObservationSet, SamplerRng};
use bptf_sampler::conjugate::{sample_cond_normal_wishart, NormalWishartPrior, SufficientStats};
use bptf_sampler::{Session, SessionConfig, SideInfo, SolveMode};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use scirs2_core::ndarray_ext::Array2;
use std::hint::black_box;

// ============================================================================
// Data
// ============================================================================

fn sparse_matrix(rows: usize, cols: usize, density: f64, seed: u64) -> ObservationSet {
    let mut rng = SamplerRng::seed_from(seed);
    let mut entries = Vec::new();
    for i in 0..rows {
        for j in 0..cols {
            if rng.uniform() < density {
                entries.push((vec![i, j], rng.normal()));
            }
        }
    }
    ObservationSet::sparse(vec![rows, cols], entries)
        .expect("valid benchmark data")
        .with_noise(NoiseConfig::fixed(5.0))
}

fn running_session(train: ObservationSet, num_latent: usize, threads: usize) -> Session {
    let config = SessionConfig::new()
        .with_num_latent(num_latent)
        .with_burnin(0)
        .with_nsamples(usize::MAX / 2)
        .with_seed(42)
        .with_num_threads(threads)
        .with_verbose(0);
    let mut session = Session::builder(config)
        .train(train)
        .build()
        .expect("valid session");
    session.init().expect("init");
    session
}

// ============================================================================
// Sweep Benchmarks
// ============================================================================

fn bench_sweep_latent_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep_latent");
    group.sample_size(20);

    for &d in &[8, 16, 32] {
        let train = sparse_matrix(500, 400, 0.05, 1);
        group.throughput(Throughput::Elements(train.values().len() as u64));
        let mut session = running_session(train, d, 0);
        group.bench_with_input(BenchmarkId::from_parameter(format!("d{}", d)), &d, |b, _| {
            b.iter(|| black_box(session.step().expect("step")))
        });
    }

    group.finish();
}

fn bench_sweep_threads(c: &mut Criterion) {
    let mut group = c.benchmark_group("sweep_threads");
    group.sample_size(20);

    for &threads in &[1, 2, 4] {
        let mut session = running_session(sparse_matrix(1000, 300, 0.05, 2), 16, threads);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("t{}", threads)),
            &threads,
            |b, _| b.iter(|| black_box(session.step().expect("step"))),
        );
    }

    group.finish();
}

// ============================================================================
// Conjugate and Side-Information Benchmarks
// ============================================================================

fn bench_cond_normal_wishart(c: &mut Criterion) {
    let mut group = c.benchmark_group("cond_normal_wishart");

    for &d in &[8, 32, 64] {
        let mut rng = SamplerRng::seed_from(7);
        let columns = Array2::from_shape_fn((d, 2000), |_| rng.normal());
        let stats = SufficientStats::from_columns(&columns.view());
        let prior = NormalWishartPrior::standard(d);
        group.bench_with_input(BenchmarkId::from_parameter(d), &d, |b, _| {
            b.iter(|| black_box(sample_cond_normal_wishart(&stats, &prior, &mut rng)))
        });
    }

    group.finish();
}

fn bench_ridge_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("ridge_solve");
    group.sample_size(20);

    let mut rng = SamplerRng::seed_from(11);
    let features = Array2::from_shape_fn((400, 120), |_| {
        if rng.uniform() < 0.1 {
            rng.normal()
        } else {
            0.0
        }
    });
    let rhs = Array2::from_shape_fn((120, 16), |_| rng.normal());

    for mode in [SolveMode::Direct, SolveMode::Iterative] {
        let side = SideInfo::dense(features.clone()).with_solve_mode(mode);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", mode)),
            &side,
            |b, side| b.iter(|| black_box(side.solve_ridge(&rhs.view(), 10.0, None))),
        );
    }

    group.finish();
}

criterion_group!(sweep_benches, bench_sweep_latent_sizes, bench_sweep_threads);
criterion_group!(conjugate_benches, bench_cond_normal_wishart, bench_ridge_solve);
criterion_main!(sweep_benches, conjugate_benches);
