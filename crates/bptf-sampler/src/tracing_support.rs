//! Logging setup for sampling runs
//!
//! Library code only emits `tracing` events. A binary calls [`init_tracing`]
//! once: `RUST_LOG` picks the filter (default `bptf_sampler=info,warn`) and
//! `BPTF_LOG_FORMAT=json` switches from one compact line per event to one
//! JSON object per event. Worker threads are named `bptf-worker-<i>`, so
//! thread names are always printed.

use crate::checkpoint::SnapshotKind;
use anyhow::Result;
use std::time::Duration;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "bptf_sampler=info,warn";

/// Install the global subscriber described by `RUST_LOG` and `BPTF_LOG_FORMAT`
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init_tracing() -> Result<()> {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string());
    let json = std::env::var("BPTF_LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    install(&filter, json)
}

fn install(filter: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_new(filter)?;
    let registry = tracing_subscriber::registry();
    if json {
        let layer = fmt::layer().json().with_thread_names(true).with_filter(filter);
        registry.with(layer).try_init()?;
    } else {
        let layer = fmt::layer().compact().with_thread_names(true).with_filter(filter);
        registry.with(layer).try_init()?;
    }
    Ok(())
}

/// Debug event for one snapshot file written by the store
pub fn record_snapshot_write(
    kind: SnapshotKind,
    iteration: usize,
    file: &str,
    bytes: usize,
    elapsed: Duration,
) {
    let secs = elapsed.as_secs_f64().max(1e-6);
    tracing::debug!(
        %kind,
        iteration,
        file,
        bytes,
        elapsed_ms = elapsed.as_millis() as u64,
        mib_per_sec = bytes as f64 / (1024.0 * 1024.0) / secs,
        "snapshot written"
    );
}
