//! Metrics for observability.
//!
//! Emits through the `metrics` facade; the embedding process decides whether
//! and how to export (Prometheus, StatsD, nothing at all).
//!
//! # Metric Naming Convention
//!
//! All metrics are prefixed with `object_sync_` and follow Prometheus conventions:
//! - Counters end in `_total`
//! - Gauges represent current state
//! - Histograms track distributions (duration, size)
//!
//! # Usage
//!
//! ```rust,no_run
//! use object_sync::metrics;
//! use std::time::Duration;
//!
//! // After a fetch lands in staging
//! metrics::record_bytes("fetch", 4096);
//! metrics::record_operation_latency("fetch", Duration::from_millis(35));
//! ```

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record a per-key outcome by status (`succeeded`, `skipped`, `failed`, `cancelled`).
pub fn record_outcome(status: &str) {
    counter!("object_sync_outcomes_total", "status" => status.to_string()).increment(1);
}

/// Record bytes moved by `operation` (`fetch` or `upload`).
pub fn record_bytes(operation: &str, bytes: u64) {
    counter!("object_sync_bytes_total", "operation" => operation.to_string()).increment(bytes);
}

/// Record a retry of `operation` (one per extra attempt).
pub fn record_retry(operation: &str) {
    counter!("object_sync_retries_total", "operation" => operation.to_string()).increment(1);
}

/// Record how long one successful `operation` took, retries included.
pub fn record_operation_latency(operation: &str, duration: Duration) {
    histogram!(
        "object_sync_operation_duration_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record end-to-end duration of one key's task.
pub fn record_task_duration(duration: Duration) {
    histogram!("object_sync_task_duration_seconds").record(duration.as_secs_f64());
}

/// Record a staging failure (`create` or `remove`).
pub fn record_staging_error(phase: &str) {
    counter!("object_sync_staging_errors_total", "phase" => phase.to_string()).increment(1);
}

/// Gauge for tasks currently executing.
pub fn set_in_flight(count: usize) {
    gauge!("object_sync_in_flight_tasks").set(count as f64);
}

/// Record a store connection attempt for `side` (`source` / `destination`).
pub fn record_connection(side: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("object_sync_connections_total", "side" => side.to_string(), "status" => status).increment(1);
}

/// Record a checkpoint write.
pub fn record_checkpoint_write(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("object_sync_checkpoint_writes_total", "status" => status).increment(1);
}

/// Gauge for engine state.
pub fn set_engine_state(state: &str) {
    // Numeric for alerting
    let value = match state {
        "Created" => 0.0,
        "Connecting" => 1.0,
        "Running" => 2.0,
        "Draining" => 3.0,
        "Stopped" => 4.0,
        "Failed" => 5.0,
        _ => -1.0,
    };
    gauge!("object_sync_engine_state").set(value);
}

/// Record a completed run.
pub fn record_run_complete(total: usize, failed: usize, duration: Duration) {
    counter!("object_sync_runs_total").increment(1);
    counter!("object_sync_run_keys_total").increment(total as u64);
    if failed > 0 {
        counter!("object_sync_run_failed_keys_total").increment(failed as u64);
    }
    histogram!("object_sync_run_duration_seconds").record(duration.as_secs_f64());
}
