// src/core/metrics.rs

//! Defines and registers process-wide Prometheus metrics for the sync layer.
//!
//! This module uses `lazy_static` so that metrics are registered only once,
//! no matter how many sessions the process opens.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, TextEncoder, register_counter, register_counter_vec,
    register_gauge, register_histogram,
};

lazy_static! {
    // --- Gauges ---
    /// The number of update tasks currently alive across all sessions.
    pub static ref ACTIVE_UPDATE_TASKS: Gauge =
        register_gauge!("marketsync_active_update_tasks", "Number of live update tasks.").unwrap();
    /// The number of sessions not yet shut down or dropped.
    pub static ref OPEN_SESSIONS: Gauge =
        register_gauge!("marketsync_open_sessions", "Number of open sessions.").unwrap();

    // --- Counters ---
    pub static ref SESSIONS_OPENED_TOTAL: Counter =
        register_counter!("marketsync_sessions_opened_total", "Total number of sessions established.").unwrap();
    /// Values written to a cache, labeled by schema.
    pub static ref UPDATES_APPLIED_TOTAL: CounterVec =
        register_counter_vec!("marketsync_updates_applied_total", "Total number of updates applied to a cache, labeled by schema.", &["schema"]).unwrap();
    pub static ref STALE_UPDATES_TOTAL: Counter =
        register_counter!("marketsync_stale_updates_total", "Total number of out-of-order updates discarded.").unwrap();
    pub static ref FETCH_ERRORS_TOTAL: Counter =
        register_counter!("marketsync_fetch_errors_total", "Total number of failed fetches or stream errors.").unwrap();
    pub static ref DECODE_ERRORS_TOTAL: Counter =
        register_counter!("marketsync_decode_errors_total", "Total number of undecodable payloads.").unwrap();
    pub static ref FATAL_TASK_FAULTS_TOTAL: Counter =
        register_counter!("marketsync_fatal_task_faults_total", "Total number of update tasks stopped by a fatal fault.").unwrap();

    // --- Histograms ---
    /// Round-trip latency of a single fetch from the data source.
    pub static ref FETCH_LATENCY_SECONDS: Histogram =
        register_histogram!("marketsync_fetch_latency_seconds", "Latency of data source fetches in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families).unwrap_or_default()
}
