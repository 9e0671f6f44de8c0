//! Prometheus metrics for the control core
//!
//! This module tracks:
//! - Fallback routing: which backend served each read/write, total failures
//! - Rank assignment: per-worker write outcomes, last observed pool size
//! - Readiness: number of polls spent waiting on the peer
//!
//! # Usage
//!
//! Call `init_metrics()` at application startup to register all metrics.
//! If initialization fails, metrics operations become no-ops.

use prometheus::{
    register_counter, register_counter_vec, register_gauge, Counter, CounterVec, Encoder, Gauge,
    TextEncoder,
};
use std::sync::OnceLock;

// ============================================================================
// Metrics Storage
// ============================================================================

struct ControlMetrics {
    fallback_requests: CounterVec,
    rank_writes: CounterVec,
    assignment_cycles: CounterVec,
    readiness_polls: Counter,
    pool_size: Gauge,
}

/// Registration outcome; concurrent callers block until the first finishes
static CONTROL_METRICS: OnceLock<Result<ControlMetrics, String>> = OnceLock::new();

fn metrics() -> Option<&'static ControlMetrics> {
    CONTROL_METRICS.get().and_then(|m| m.as_ref().ok())
}

// ============================================================================
// Initialization
// ============================================================================

/// Initialize all Prometheus metrics
///
/// Safe to call more than once; only the first call registers anything.
pub fn init_metrics() -> Result<(), Box<dyn std::error::Error>> {
    match CONTROL_METRICS.get_or_init(|| register_metrics().map_err(|e| e.to_string())) {
        Ok(_) => Ok(()),
        Err(e) => Err(e.clone().into()),
    }
}

fn register_metrics() -> Result<ControlMetrics, prometheus::Error> {
    let metrics = ControlMetrics {
        fallback_requests: register_counter_vec!(
            "framectl_fallback_requests_total",
            "Routed requests by operation and serving backend",
            &["op", "backend"]
        )?,
        rank_writes: register_counter_vec!(
            "framectl_rank_writes_total",
            "Rank configuration writes by outcome",
            &["outcome"]
        )?,
        assignment_cycles: register_counter_vec!(
            "framectl_assignment_cycles_total",
            "Rank assignment cycles by result",
            &["result"]
        )?,
        readiness_polls: register_counter!(
            "framectl_readiness_polls_total",
            "Total readiness polls issued against the peer"
        )?,
        pool_size: register_gauge!(
            "framectl_pool_size",
            "Worker pool size observed by the last assignment cycle"
        )?,
    };

    tracing::info!("Prometheus metrics initialized successfully");
    Ok(metrics)
}

/// Check if metrics have been initialized
pub fn metrics_initialized() -> bool {
    metrics().is_some()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Record which backend served a routed request (`none` on total failure)
pub fn record_fallback(op: &str, backend: &str) {
    if let Some(m) = metrics() {
        m.fallback_requests.with_label_values(&[op, backend]).inc();
    }
}

/// Record one rank configuration write
pub fn record_rank_write(success: bool) {
    if let Some(m) = metrics() {
        let outcome = if success { "success" } else { "failure" };
        m.rank_writes.with_label_values(&[outcome]).inc();
    }
}

/// Record the end of an assignment cycle
pub fn record_assignment_cycle(result: &str, pool_size: Option<usize>) {
    let Some(m) = metrics() else {
        return;
    };

    m.assignment_cycles.with_label_values(&[result]).inc();
    if let Some(size) = pool_size {
        m.pool_size.set(size as f64);
    }
}

/// Record a readiness poll
pub fn record_readiness_poll() {
    if let Some(m) = metrics() {
        m.readiness_polls.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init_metrics().unwrap();
        init_metrics().unwrap();
        assert!(metrics_initialized());
    }

    #[test]
    fn test_recorded_metrics_are_encoded() {
        init_metrics().unwrap();
        record_fallback("read", "secondary");
        record_rank_write(true);
        record_assignment_cycle("complete", Some(3));
        record_readiness_poll();

        let text = encode_metrics().unwrap();
        assert!(text.contains("framectl_fallback_requests_total"));
        assert!(text.contains("framectl_pool_size"));
    }
}
