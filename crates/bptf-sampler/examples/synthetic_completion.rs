//! Matrix completion on synthetic low-rank data
//!
//! This example demonstrates:
//! - Building a sparse training matrix and a held-out test set
//! - Running a session with side information on the rows
//! - Saving posterior samples and predicting from them afterwards
//!
//! Run with: cargo run --example synthetic_completion

use anyhow::Result;
use bptf_core::{NoiseConfig, ObservationSet, SamplerRng};
use bptf_sampler::tracing_support::init_tracing;
use bptf_sampler::{PredictSession, Session, SessionConfig, SideInfo};
use scirs2_core::ndarray_ext::Array2;

const ROWS: usize = 200;
const COLS: usize = 150;
const RANK: usize = 3;
const FEATURES: usize = 5;

fn main() -> Result<()> {
    init_tracing()?;

    println!("=== Synthetic Matrix Completion ===\n");

    // Rows are driven by observed features, columns are free
    let mut rng = SamplerRng::seed_from(2024);
    let features = Array2::from_shape_fn((ROWS, FEATURES), |_| rng.normal());
    let mixing = Array2::from_shape_fn((FEATURES, RANK), |_| rng.normal() * 0.5);
    let u = features.dot(&mixing);
    let v = Array2::from_shape_fn((COLS, RANK), |_| rng.normal());
    let truth = u.dot(&v.t());

    let mut train = Vec::new();
    let mut test = Vec::new();
    for i in 0..ROWS {
        for j in 0..COLS {
            let r = rng.uniform();
            let value = truth[[i, j]] + 0.1 * rng.normal();
            if r < 0.15 {
                train.push((vec![i, j], value));
            } else if r < 0.18 {
                test.push((vec![i, j], value));
            }
        }
    }
    println!("{} training cells, {} held out\n", train.len(), test.len());

    let train = ObservationSet::sparse(vec![ROWS, COLS], train)?.with_noise(NoiseConfig::adaptive(1.0, 10.0));
    let test = ObservationSet::sparse(vec![ROWS, COLS], test)?;

    let save_dir = std::env::temp_dir().join("bptf-synthetic-completion");
    let config = SessionConfig::new()
        .with_num_latent(8)
        .with_burnin(100)
        .with_nsamples(100)
        .with_seed(7)
        .with_save_freq(10)
        .with_save_dir(&save_dir);

    let mut session = Session::builder(config)
        .train(train)
        .test(test.clone())
        .side_info(0, SideInfo::dense(features.clone()))
        .build()?;
    let status = session.run()?;
    println!("\nFinal: {}", status);

    let predict = PredictSession::from_dir(&save_dir)?;
    let result = predict.predict_observations(&test)?;
    println!(
        "\nRMSE from {} saved samples: {:.4}",
        predict.num_samples(),
        result.rmse_avg().unwrap_or(f64::NAN)
    );

    // A row the model has never seen, scored through its features alone
    let fresh = features.row(0).to_owned();
    let scores = predict.predict_from_features(0, &fresh.view())?;
    println!(
        "Out-of-matrix prediction for the features of row 0, column 0: {:.3} (truth {:.3})",
        scores[0].mean,
        truth[[0, 0]]
    );

    Ok(())
}
