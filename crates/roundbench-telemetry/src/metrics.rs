//! Prometheus metrics for roundbench.
//!
//! Covers:
//! - Run outcomes
//! - Per-phase round-trip latency
//! - REST request outcomes
//! - Push events and decode failures
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a programming error caught on first use.

use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};
use roundbench_core::{Phase, TimingSnapshot};

use crate::error::{TelemetryError, TelemetryResult};

/// Completed runs.
/// Labels: outcome (done, or the failure kind)
pub static RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "roundbench_runs_total",
        "Total round-trip runs by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Phase latency in microseconds.
pub static PHASE_LATENCY_US: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "roundbench_phase_latency_us",
        "Round-trip phase latency in microseconds",
        &["phase"],
        vec![
            100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0, 25_000.0, 50_000.0,
            100_000.0, 250_000.0, 500_000.0, 1_000_000.0
        ]
    )
    .unwrap()
});

/// Order updates dropped as malformed.
pub static PUSH_DECODE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "roundbench_push_decode_failures_total",
        "Malformed order updates dropped by the push listener"
    )
    .unwrap()
});

/// Order updates consumed by the coordinator.
/// Labels: execution (NEW, CANCELED, other venue values)
pub static PUSH_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "roundbench_push_events_total",
        "Order updates received on the push channel",
        &["execution"]
    )
    .unwrap()
});

/// Signed REST requests.
/// Labels: method (place/cancel/listen_key), outcome (ok or error kind)
pub static REST_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "roundbench_rest_requests_total",
        "REST requests by method and outcome",
        &["method", "outcome"]
    )
    .unwrap()
});

/// Metrics facade for easy access.
pub struct Metrics;

impl Metrics {
    /// Record the end of a run.
    pub fn run_finished(outcome: &str) {
        RUNS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn phase_latency(phase: Phase, elapsed: Duration) {
        PHASE_LATENCY_US
            .with_label_values(&[phase.as_str()])
            .observe(elapsed.as_secs_f64() * 1_000_000.0);
    }

    /// Observe every phase whose bounds were recorded.
    pub fn record_phases(snapshot: &TimingSnapshot) {
        for (phase, elapsed) in snapshot.phases() {
            Self::phase_latency(phase, elapsed);
        }
    }

    pub fn push_decode_failures(count: u64) {
        PUSH_DECODE_FAILURES_TOTAL.inc_by(count);
    }

    pub fn push_event(execution: &str) {
        PUSH_EVENTS_TOTAL.with_label_values(&[execution]).inc();
    }

    pub fn rest_request(method: &str, outcome: &str) {
        REST_REQUESTS_TOTAL
            .with_label_values(&[method, outcome])
            .inc();
    }

    /// Encode the default registry in the text exposition format.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&prometheus::gather(), &mut buffer)
            .map_err(|e| TelemetryError::Metrics(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Metrics(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roundbench_core::{Checkpoint, TimingRecorder};

    #[test]
    fn test_run_counter_by_outcome() {
        let before = RUNS_TOTAL.with_label_values(&["timeout"]).get();
        Metrics::run_finished("timeout");
        assert_eq!(RUNS_TOTAL.with_label_values(&["timeout"]).get(), before + 1);
    }

    #[test]
    fn test_record_phases_observes_recorded_phases_only() {
        let mut rec = TimingRecorder::new();
        rec.mark(Checkpoint::RunStart).unwrap();
        rec.mark(Checkpoint::SessionReady).unwrap();

        let setup = PHASE_LATENCY_US.with_label_values(&["session_setup"]);
        let teardown = PHASE_LATENCY_US.with_label_values(&["teardown"]);
        let (setup_before, teardown_before) = (setup.get_sample_count(), teardown.get_sample_count());

        Metrics::record_phases(&rec.snapshot());

        assert_eq!(setup.get_sample_count(), setup_before + 1);
        assert_eq!(teardown.get_sample_count(), teardown_before);
    }

    #[test]
    fn test_render_includes_metrics() {
        Metrics::rest_request("place", "ok");
        Metrics::push_event("NEW");
        Metrics::push_decode_failures(2);

        let text = Metrics::render().unwrap();
        assert!(text.contains("roundbench_rest_requests_total"));
        assert!(text.contains("roundbench_push_events_total"));
        assert!(text.contains("roundbench_push_decode_failures_total"));
    }
}
