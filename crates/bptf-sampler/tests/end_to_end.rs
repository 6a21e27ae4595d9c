//! End-to-end sampling runs on small matrices and tensors

use bptf_core::{NoiseConfig, ObservationSet};
use bptf_sampler::{
    PriorKind, Session, SessionConfig, SessionPhase, SideInfo, SolveMode,
};
use scirs2_core::ndarray_ext::Array2;

const TRAIN: [[f64; 4]; 3] = [[1.0, 5.0, 9.0, 2.0], [6.0, 10.0, 3.0, 7.0], [11.0, 4.0, 8.0, 12.0]];

fn dense_train() -> ObservationSet {
    let values: Vec<f64> = TRAIN.iter().flatten().copied().collect();
    ObservationSet::dense(vec![3, 4], values)
        .unwrap()
        .with_noise(NoiseConfig::fixed(1.0))
}

fn held_out() -> ObservationSet {
    ObservationSet::sparse(
        vec![3, 4],
        vec![
            (vec![0, 1], TRAIN[0][1]),
            (vec![1, 3], TRAIN[1][3]),
            (vec![2, 0], TRAIN[2][0]),
        ],
    )
    .unwrap()
}

fn small_config() -> SessionConfig {
    SessionConfig::new()
        .with_num_latent(4)
        .with_burnin(50)
        .with_nsamples(50)
        .with_seed(1234)
        .with_num_threads(2)
        .with_verbose(0)
}

fn features(rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(i, j)| ((i * 7 + j * 3) % 5) as f64 - 2.0)
}

/// Recorded `rmse_avg` of the dense run below with seed 1234 on two workers.
/// The draws depend on how entities are split across workers, so the value
/// only holds at that thread count.
const EXPECTED_RMSE_TWO_THREADS: f64 = 0.227385406196;

#[test]
fn test_dense_matrix_is_reproducible_with_fixed_seed() {
    let run = || {
        let mut session = Session::builder(small_config().with_priors(vec![PriorKind::Normal; 2]))
            .train(dense_train())
            .test(held_out())
            .build()
            .unwrap();
        let status = session.run().unwrap();
        assert_eq!(status.phase, SessionPhase::Finished);
        assert_eq!(status.iteration, 100);
        assert_eq!(session.result().unwrap().nsamples(), 50);
        status.rmse_avg.unwrap()
    };

    let first = run();
    let second = run();
    assert!(first.is_finite());
    assert!((first - second).abs() < 1e-6, "{} vs {}", first, second);
    assert!(
        (first - EXPECTED_RMSE_TWO_THREADS).abs() < 1e-6,
        "rmse_avg {} drifted from the recorded {}",
        first,
        EXPECTED_RMSE_TWO_THREADS
    );
}

#[test]
fn test_side_info_row_mismatch_fails_before_sampling() {
    let err = Session::builder(small_config())
        .train(dense_train())
        .side_info(0, SideInfo::dense(features(5, 2)))
        .build()
        .unwrap_err();
    assert!(err.is_configuration(), "{}", err);
    assert!(err.to_string().contains("mode 0"));
}

#[test]
fn test_side_info_prior_needs_features() {
    let err = Session::builder(small_config().with_priors(vec![PriorKind::Macau, PriorKind::Normal]))
        .train(dense_train())
        .build()
        .unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_every_prior_runs_to_completion() {
    let cases = vec![
        vec![PriorKind::Normal, PriorKind::NormalOne],
        vec![PriorKind::SpikeAndSlab, PriorKind::Normal],
        vec![PriorKind::Macau, PriorKind::Normal],
        vec![PriorKind::MacauOne, PriorKind::Normal],
    ];
    for priors in cases {
        let uses_side_info = matches!(priors[0], PriorKind::Macau | PriorKind::MacauOne);
        let config = small_config()
            .with_burnin(5)
            .with_nsamples(5)
            .with_priors(priors.clone());
        let mut builder = Session::builder(config).train(dense_train()).test(held_out());
        if uses_side_info {
            builder = builder.side_info(0, SideInfo::dense(features(3, 2)));
        }
        let mut session = builder.build().unwrap();
        let status = session.run().unwrap();
        assert_eq!(status.phase, SessionPhase::Finished, "{:?}", priors);
        assert!(status.rmse_avg.unwrap().is_finite(), "{:?}", priors);
        assert_eq!(status.priors.len(), 2);
        if uses_side_info {
            assert!(session.model().unwrap().link_matrix(0).is_some());
        }
    }
}

#[test]
fn test_macau_with_sparse_features_and_iterative_solver() {
    let sparse = bptf_sparse::CsrMatrix::from_dense(&features(3, 4).view(), 0.0).unwrap();
    let side = SideInfo::sparse(sparse)
        .with_solve_mode(SolveMode::Iterative)
        .with_tolerance(1e-8)
        .with_lambda_beta_sampling(true);
    let mut session = Session::builder(small_config().with_burnin(5).with_nsamples(5))
        .train(dense_train())
        .side_info(0, side)
        .build()
        .unwrap();
    session.run().unwrap();
    assert_eq!(session.priors()[0].kind(), PriorKind::Macau);
    let link = session.model().unwrap().link_matrix(0).unwrap();
    assert_eq!(link.beta.dim(), (4, 4));
}

#[test]
fn test_three_mode_tensor_with_adaptive_noise() {
    let mut entries = Vec::new();
    for i in 0..4 {
        for j in 0..3 {
            for k in 0..2 {
                if (i + j + k) % 3 != 0 {
                    let v = (i as f64 + 1.0) * (j as f64 - 1.0) * (k as f64 + 0.5);
                    entries.push((vec![i, j, k], v));
                }
            }
        }
    }
    let train = ObservationSet::sparse(vec![4, 3, 2], entries)
        .unwrap()
        .with_noise(NoiseConfig::adaptive(1.0, 10.0));
    let test = ObservationSet::sparse(vec![4, 3, 2], vec![(vec![0, 0, 0], 0.5)]).unwrap();

    let mut session = Session::builder(small_config().with_num_latent(3).with_burnin(10).with_nsamples(10))
        .train(train)
        .test(test)
        .build()
        .unwrap();
    let status = session.run().unwrap();
    assert_eq!(session.dims(), &[4, 3, 2]);
    assert!(status.rmse_avg.unwrap().is_finite());
    assert!(session.blocks()[0].noise().get_alpha() > 0.0);
}

#[test]
fn test_probit_reports_auc() {
    let mut entries = Vec::new();
    for i in 0..6 {
        for j in 0..5 {
            if (i * 5 + j) % 4 != 0 {
                entries.push((vec![i, j], f64::from(u8::from((i + j) % 2 == 0))));
            }
        }
    }
    let train = ObservationSet::sparse(vec![6, 5], entries)
        .unwrap()
        .with_noise(NoiseConfig::probit(0.5));
    let test = ObservationSet::sparse(
        vec![6, 5],
        vec![(vec![0, 0], 1.0), (vec![1, 3], 1.0), (vec![2, 1], 0.0), (vec![4, 3], 0.0)],
    )
    .unwrap();

    let config = small_config().with_burnin(10).with_nsamples(10).with_threshold(0.5);
    let mut session = Session::builder(config).train(train).test(test).build().unwrap();
    let status = session.run().unwrap();
    let auc = status.auc_avg.unwrap();
    assert!((0.0..=1.0).contains(&auc));
    assert!(status.to_string().contains("AUC"));
}

#[test]
fn test_aux_block_extends_a_mode() {
    // Aux rows 3..5 sit below the training matrix and share its columns
    let aux = ObservationSet::dense(vec![2, 4], vec![1.0, 2.0, 3.0, 4.0, 4.0, 3.0, 2.0, 1.0])
        .unwrap()
        .with_noise(NoiseConfig::sampled(2.0));
    let mut session = Session::builder(small_config().with_burnin(5).with_nsamples(5))
        .train(dense_train())
        .aux_data(aux, vec![3, 0])
        .build()
        .unwrap();
    session.run().unwrap();
    assert_eq!(session.dims(), &[5, 4]);
    assert_eq!(session.model().unwrap().factor(0).ncols(), 5);
    assert_eq!(session.status().noise.len(), 2);
}

#[test]
fn test_finished_session_refuses_further_steps() {
    let mut session = Session::builder(small_config().with_burnin(1).with_nsamples(1))
        .train(dense_train())
        .build()
        .unwrap();
    session.run().unwrap();
    assert!(session.step().is_err());
    assert_eq!(session.phase(), SessionPhase::Finished);
}
