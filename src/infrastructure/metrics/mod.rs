//! Prometheus metrics for the session lifecycle.
//!
//! - Session loads by outcome (fresh, resumed, stale, invalid cookie, error)
//! - Session saves by outcome (saved, deleted, too large, error)
//! - Serialized record sizes
//! - Redis connection and circuit breaker state

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter_vec, register_int_gauge, Histogram, IntCounterVec,
    IntGauge, TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "session_store";

lazy_static! {
    /// Session loads by outcome
    pub static ref SESSION_LOADS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_loads_total", METRIC_PREFIX),
        "Total session loads by outcome",
        &["result"]
    ).unwrap();

    /// Session saves by outcome
    pub static ref SESSION_SAVES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_saves_total", METRIC_PREFIX),
        "Total session saves by outcome",
        &["result"]
    ).unwrap();

    /// Serialized record size in bytes
    pub static ref SESSION_RECORD_BYTES: Histogram = register_histogram!(
        format!("{}_record_bytes", METRIC_PREFIX),
        "Serialized session record size in bytes",
        vec![64.0, 256.0, 512.0, 1024.0, 2048.0, 4096.0, 16384.0]
    ).unwrap();

    /// Redis connection status (1 = connected, 0 = disconnected)
    pub static ref REDIS_CONNECTION_STATUS: IntGauge = register_int_gauge!(
        format!("{}_redis_connection_status", METRIC_PREFIX),
        "Redis connection status (1=connected, 0=disconnected)"
    ).unwrap();

    /// Redis circuit breaker state (0=closed, 1=open, 2=half-open)
    pub static ref REDIS_CIRCUIT_BREAKER_STATE: IntGauge = register_int_gauge!(
        format!("{}_redis_circuit_breaker_state", METRIC_PREFIX),
        "Redis circuit breaker state (0=closed, 1=open, 2=half-open)"
    ).unwrap();
}

/// Encode all registered metrics in the Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode_to_string(&metric_families)
}

/// Outcome of building a session from a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No cookie, or the record was gone
    Fresh,
    /// Record found and its stamp matched the cookie
    Resumed,
    /// Record found but created for a different cookie
    Stale,
    InvalidCookie,
    Error,
}

impl LoadOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            LoadOutcome::Fresh => "fresh",
            LoadOutcome::Resumed => "resumed",
            LoadOutcome::Stale => "stale",
            LoadOutcome::InvalidCookie => "invalid_cookie",
            LoadOutcome::Error => "error",
        }
    }
}

/// Outcome of persisting a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved,
    Deleted,
    TooLarge,
    Error,
}

impl SaveOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SaveOutcome::Saved => "saved",
            SaveOutcome::Deleted => "deleted",
            SaveOutcome::TooLarge => "too_large",
            SaveOutcome::Error => "error",
        }
    }
}

/// Helper for recording session metrics
pub struct SessionMetrics;

impl SessionMetrics {
    pub fn record_load(outcome: LoadOutcome) {
        SESSION_LOADS_TOTAL
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn record_save(outcome: SaveOutcome) {
        SESSION_SAVES_TOTAL
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn record_size(bytes: usize) {
        SESSION_RECORD_BYTES.observe(bytes as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_metrics_are_exported() {
        SessionMetrics::record_load(LoadOutcome::Stale);
        SessionMetrics::record_save(SaveOutcome::TooLarge);
        SessionMetrics::record_size(128);

        let output = encode_metrics().unwrap();
        assert!(output.contains("session_store_loads_total{result=\"stale\"}"));
        assert!(output.contains("session_store_saves_total{result=\"too_large\"}"));
        assert!(output.contains("session_store_record_bytes_bucket"));
    }
}
