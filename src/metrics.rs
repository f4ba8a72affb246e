//! Prometheus metrics for fetches and pipeline stages
//!
//! Runs are short-lived batch jobs, so there is no scrape endpoint. The
//! registry is dumped in text exposition format with [`write_textfile`] for a
//! node_exporter textfile collector to pick up.

use std::path::Path;

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec, IntGauge, TextEncoder};
use tracing::info;

use crate::error::Result;

pub const STAGE_DISCOVER: &str = "discover";
pub const STAGE_EXTRACT: &str = "extract";
pub const STAGE_NORMALIZE: &str = "normalize";
pub const STAGE_STORE: &str = "store";

/// Outcomes of a single fetch attempt
pub const ATTEMPT_SUCCESS: &str = "success";
pub const ATTEMPT_RETRY: &str = "retry";
pub const ATTEMPT_FAILURE: &str = "failure";

static FETCH_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "ingestion_fetch_in_flight",
        "HTTP attempts currently holding a limiter permit"
    )
    .expect("Failed to create fetch_in_flight metric")
});

static FETCH_ATTEMPTS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ingestion_fetch_attempts_total",
        "HTTP attempts by outcome",
        &["outcome"]
    )
    .expect("Failed to create fetch_attempts metric")
});

static RECORDS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "ingestion_records_total",
        "Records passed on or dropped by each stage",
        &["stage", "outcome"]
    )
    .expect("Failed to create records metric")
});

pub fn inc_fetch_in_flight() {
    FETCH_IN_FLIGHT.inc();
}

pub fn dec_fetch_in_flight() {
    FETCH_IN_FLIGHT.dec();
}

pub fn fetch_in_flight() -> i64 {
    FETCH_IN_FLIGHT.get()
}

/// Records one fetch attempt with one of the `ATTEMPT_*` outcomes
pub fn record_fetch_attempt(outcome: &str) {
    FETCH_ATTEMPTS.with_label_values(&[outcome]).inc();
}

pub fn fetch_attempts(outcome: &str) -> u64 {
    FETCH_ATTEMPTS.with_label_values(&[outcome]).get()
}

/// Records what a stage kept and what it dropped
pub fn record_stage(stage: &str, passed: usize, dropped: usize) {
    RECORDS.with_label_values(&[stage, "passed"]).inc_by(passed as u64);
    RECORDS.with_label_values(&[stage, "dropped"]).inc_by(dropped as u64);
}

pub fn stage_records(stage: &str, outcome: &str) -> u64 {
    RECORDS.with_label_values(&[stage, outcome]).get()
}

/// Collects all metrics as Prometheus text format
pub fn gather_metrics() -> Result<String> {
    // Touch the lazies so an idle run still exports every family
    Lazy::force(&FETCH_IN_FLIGHT);
    Lazy::force(&FETCH_ATTEMPTS);
    Lazy::force(&RECORDS);

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Writes the metrics next to `path` and renames them into place
pub fn write_textfile(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, gather_metrics()?)?;
    std::fs::rename(&tmp, path)?;

    info!(path = %path.display(), "Wrote metrics");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_records_accumulate() {
        let passed = stage_records(STAGE_NORMALIZE, "passed");
        let dropped = stage_records(STAGE_NORMALIZE, "dropped");

        record_stage(STAGE_NORMALIZE, 3, 1);

        assert!(stage_records(STAGE_NORMALIZE, "passed") >= passed + 3);
        assert!(stage_records(STAGE_NORMALIZE, "dropped") >= dropped + 1);
    }

    #[test]
    fn test_textfile_export() {
        record_fetch_attempt(ATTEMPT_SUCCESS);
        record_stage(STAGE_STORE, 2, 0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics").join("news_ingestion.prom");
        write_textfile(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("ingestion_fetch_attempts_total{outcome=\"success\"}"));
        assert!(text.contains("ingestion_fetch_in_flight"));
        assert!(text.contains("# TYPE ingestion_records_total counter"));
    }
}
