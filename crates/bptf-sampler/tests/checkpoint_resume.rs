//! Checkpoint, interrupt and resume

use bptf_core::{NoiseConfig, ObservationSet};
use bptf_sampler::{
    CheckpointStore, PriorKind, Session, SessionConfig, SessionPhase, SideInfo, SnapshotKind,
};
use scirs2_core::ndarray_ext::Array2;
use std::path::Path;
use tempfile::TempDir;

fn train() -> ObservationSet {
    let mut entries = Vec::new();
    for i in 0..8 {
        for j in 0..6 {
            if (i + 2 * j) % 3 != 0 {
                let v = (i as f64 * 0.5 - 1.0) * (j as f64 * 0.3 + 0.2) + 1.0;
                entries.push((vec![i, j], v));
            }
        }
    }
    ObservationSet::sparse(vec![8, 6], entries)
        .unwrap()
        .with_noise(NoiseConfig::fixed(10.0))
}

fn test_set() -> ObservationSet {
    ObservationSet::sparse(
        vec![8, 6],
        vec![
            (vec![0, 0], 0.8),
            (vec![3, 1], 1.25),
            (vec![6, 3], 2.1),
            (vec![7, 5], 3.0),
        ],
    )
    .unwrap()
}

fn config(dir: &Path) -> SessionConfig {
    SessionConfig::new()
        .with_num_latent(3)
        .with_burnin(40)
        .with_nsamples(60)
        .with_seed(99)
        .with_num_threads(2)
        .with_checkpoint_freq(10)
        .with_save_dir(dir)
        .with_verbose(0)
}

fn session(config: SessionConfig) -> Session {
    Session::builder(config)
        .train(train())
        .test(test_set())
        .build()
        .unwrap()
}

#[test]
fn test_interrupted_run_resumes_from_latest_checkpoint() {
    let straight_dir = TempDir::new().unwrap();
    let mut straight = session(config(straight_dir.path()));
    let straight_status = straight.run().unwrap();

    let dir = TempDir::new().unwrap();
    {
        let mut first = session(config(dir.path()));
        first.init().unwrap();
        for _ in 0..50 {
            first.step().unwrap();
        }
        assert_eq!(first.iteration(), 50);
        // dropped without finishing
    }

    let store = CheckpointStore::open_existing(dir.path()).unwrap();
    let latest = store.latest_checkpoint().unwrap();
    assert_eq!(latest.name, "checkpoint-50");
    assert_eq!(
        store
            .manifest()
            .steps
            .iter()
            .filter(|s| s.kind == SnapshotKind::Checkpoint)
            .count(),
        1
    );

    let mut resumed = session(config(dir.path()));
    resumed.init().unwrap();
    assert_eq!(resumed.iteration(), 50);
    assert_eq!(resumed.phase(), SessionPhase::Sampling);
    assert_eq!(resumed.result().unwrap().nsamples(), 10);

    let resumed_status = resumed.run().unwrap();
    assert_eq!(resumed_status.iteration, 100);
    assert_eq!(resumed.result().unwrap().len(), straight.result().unwrap().len());
    assert_eq!(resumed.result().unwrap().nsamples(), 60);
    assert_eq!(straight.result().unwrap().nsamples(), 60);

    // Resuming reseeds the workers, so the two chains only agree in
    // distribution: each posterior mean must sit within one posterior
    // standard deviation of the uninterrupted run's
    let straight_items = straight.result().unwrap().items();
    let resumed_items = resumed.result().unwrap().items();
    for (s, r) in straight_items.iter().zip(resumed_items) {
        assert_eq!(s.coords, r.coords);
        let sd = s.variance().sqrt();
        assert!(sd > 0.0);
        assert!(
            (s.pred_avg() - r.pred_avg()).abs() < sd,
            "cell {:?}: straight {} vs resumed {} (sd {})",
            s.coords,
            s.pred_avg(),
            r.pred_avg(),
            sd
        );
    }

    let a = straight_status.rmse_avg.unwrap();
    let b = resumed_status.rmse_avg.unwrap();
    assert!(a.is_finite() && b.is_finite());
    assert!((a - b).abs() < 0.25, "straight {} vs resumed {}", a, b);
}

#[test]
fn test_resume_with_side_info_restores_link_matrix() {
    let dir = TempDir::new().unwrap();
    let features = Array2::from_shape_fn((8, 2), |(i, j)| (i + j) as f64 * 0.25);
    let build = || {
        Session::builder(config(dir.path()).with_priors(vec![PriorKind::MacauOne, PriorKind::Normal]))
            .train(train())
            .side_info(0, SideInfo::dense(features.clone()))
            .build()
            .unwrap()
    };

    let mut first = build();
    first.init().unwrap();
    for _ in 0..20 {
        first.step().unwrap();
    }
    let beta = first.model().unwrap().link_matrix(0).unwrap().beta.clone();
    drop(first);

    let mut resumed = build();
    resumed.init().unwrap();
    assert_eq!(resumed.iteration(), 20);
    assert_eq!(resumed.phase(), SessionPhase::BurningIn);
    assert_eq!(resumed.model().unwrap().link_matrix(0).unwrap().beta, beta);
    resumed.run().unwrap();
}

#[test]
fn test_restore_rejects_a_different_model_shape() {
    let dir = TempDir::new().unwrap();
    let mut first = session(config(dir.path()));
    first.init().unwrap();
    for _ in 0..10 {
        first.step().unwrap();
    }

    let mut other = session(config(dir.path()).with_num_latent(5));
    let err = other.init().unwrap_err();
    assert!(err.is_configuration(), "{}", err);
    assert_eq!(other.phase(), SessionPhase::Failed);
}

#[test]
fn test_finished_store_resumes_as_finished() {
    let dir = TempDir::new().unwrap();
    let mut first = session(config(dir.path()));
    first.run().unwrap();

    let mut again = session(config(dir.path()));
    again.init().unwrap();
    assert_eq!(again.phase(), SessionPhase::Finished);
    assert!(again.step().is_err());
}
