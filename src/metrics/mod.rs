//! Prometheus metrics for the fanout service.
//!
//! - Broadcast pass metrics (passes, per-connection outcomes, duration)
//! - Lifecycle metrics (connect/disconnect registry writes and retries)
//! - Local WebSocket connection metrics
//! - Registry and Redis health metrics
//! - Payload source metrics

mod helpers;

pub use helpers::{
    encode_metrics, BroadcastMetrics, ConnectionMetrics, HttpMetrics, LifecycleMetrics,
    RegistryMetrics, SourceMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "fanout";

lazy_static! {
    // ============================================================================
    // Broadcast Metrics
    // ============================================================================

    /// Broadcast passes by result (ok, registry_unavailable, payload_encoding)
    pub static ref BROADCAST_PASSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_broadcast_passes_total", METRIC_PREFIX),
        "Total broadcast passes",
        &["result"]
    ).unwrap();

    /// Per-connection send outcomes (delivered, gone, timeout, transient)
    pub static ref DELIVERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_deliveries_total", METRIC_PREFIX),
        "Total per-connection send attempts by outcome",
        &["outcome"]
    ).unwrap();

    /// Stale connections removed from the registry
    pub static ref STALE_REMOVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_stale_removed_total", METRIC_PREFIX),
        "Total stale connections removed during broadcast"
    ).unwrap();

    /// Stale removals that failed and were left for the next pass
    pub static ref STALE_REMOVAL_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_stale_removal_failures_total", METRIC_PREFIX),
        "Total stale connection removals that failed"
    ).unwrap();

    /// Wall-clock duration of a broadcast pass
    pub static ref BROADCAST_DURATION: Histogram = register_histogram!(
        format!("{}_broadcast_duration_seconds", METRIC_PREFIX),
        "Broadcast pass duration in seconds",
        vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    /// Connections listed per pass
    pub static ref BROADCAST_RECIPIENTS: Histogram = register_histogram!(
        format!("{}_broadcast_recipients", METRIC_PREFIX),
        "Distribution of connections targeted per broadcast pass",
        vec![0.0, 1.0, 10.0, 100.0, 1000.0, 10000.0, 100000.0]
    ).unwrap();

    // ============================================================================
    // Lifecycle Metrics
    // ============================================================================

    /// Connect/disconnect events by outcome
    pub static ref LIFECYCLE_EVENTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_lifecycle_events_total", METRIC_PREFIX),
        "Total connection lifecycle events",
        &["event", "outcome"]
    ).unwrap();

    /// Out-of-band lifecycle retries by result (succeeded, failed, exhausted)
    pub static ref LIFECYCLE_RETRIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_lifecycle_retries_total", METRIC_PREFIX),
        "Total lifecycle write retries",
        &["event", "result"]
    ).unwrap();

    // ============================================================================
    // Local WebSocket Metrics
    // ============================================================================

    /// Sockets currently attached to this process
    pub static ref LOCAL_CONNECTIONS: IntGauge = register_int_gauge!(
        format!("{}_local_connections", METRIC_PREFIX),
        "Number of WebSocket connections held by this instance"
    ).unwrap();

    pub static ref WS_CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_opened_total", METRIC_PREFIX),
        "Total WebSocket connections opened"
    ).unwrap();

    pub static ref WS_CONNECTIONS_CLOSED: IntCounter = register_int_counter!(
        format!("{}_ws_connections_closed_total", METRIC_PREFIX),
        "Total WebSocket connections closed"
    ).unwrap();

    /// WebSocket connection duration
    pub static ref WS_CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_ws_connection_duration_seconds", METRIC_PREFIX),
        "WebSocket connection duration in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0, 86400.0]
    ).unwrap();

    // ============================================================================
    // Registry / Redis Metrics
    // ============================================================================

    /// Registered connections as last observed from the registry
    pub static ref REGISTRY_CONNECTIONS: IntGauge = register_int_gauge!(
        format!("{}_registry_connections", METRIC_PREFIX),
        "Number of connection ids in the registry"
    ).unwrap();

    /// Registry operation latency by backend and operation
    pub static ref REGISTRY_OPERATION_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_registry_operation_latency_seconds", METRIC_PREFIX),
        "Registry operation latency in seconds",
        &["backend", "operation"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]
    ).unwrap();

    /// Registry operation errors by backend and operation
    pub static ref REGISTRY_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_registry_errors_total", METRIC_PREFIX),
        "Total registry operation errors",
        &["backend", "operation"]
    ).unwrap();

    /// Redis connection status (1=connected, 0=disconnected)
    pub static ref REDIS_CONNECTION_STATUS: IntGauge = register_int_gauge!(
        format!("{}_redis_connection_status", METRIC_PREFIX),
        "Redis connection status (1=connected, 0=disconnected)"
    ).unwrap();

    /// Circuit breaker state (0=closed, 1=open, 2=half-open)
    pub static ref REDIS_CIRCUIT_BREAKER_STATE: IntGauge = register_int_gauge!(
        format!("{}_redis_circuit_breaker_state", METRIC_PREFIX),
        "Redis circuit breaker state (0=closed, 1=open, 2=half-open)"
    ).unwrap();

    // ============================================================================
    // HTTP Metrics
    // ============================================================================

    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_http_requests_total", METRIC_PREFIX),
        "Total HTTP requests",
        &["endpoint", "status"]
    ).unwrap();

    // ============================================================================
    // Payload Source Metrics
    // ============================================================================

    /// Upstream fetches by source and result (ok, error)
    pub static ref SOURCE_FETCHES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_source_fetches_total", METRIC_PREFIX),
        "Total payload source fetches",
        &["source", "result"]
    ).unwrap();

    pub static ref SOURCE_FETCH_LATENCY: Histogram = register_histogram!(
        format!("{}_source_fetch_latency_seconds", METRIC_PREFIX),
        "Payload source fetch latency in seconds",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics() {
        // lazy_static metrics register on first access
        LOCAL_CONNECTIONS.set(1);

        let output = encode_metrics().unwrap();
        assert!(output.contains("fanout_local_connections"));
    }

    #[test]
    fn test_broadcast_metrics() {
        BROADCAST_PASSES_TOTAL.with_label_values(&["ok"]).inc();
        DELIVERIES_TOTAL.with_label_values(&["delivered"]).inc_by(3);
        STALE_REMOVED_TOTAL.inc();
        BROADCAST_DURATION.observe(0.02);
        BROADCAST_RECIPIENTS.observe(3.0);
    }

    #[test]
    fn test_redis_metrics() {
        REDIS_CONNECTION_STATUS.set(1);
        REDIS_CIRCUIT_BREAKER_STATE.set(0);
        REGISTRY_ERRORS_TOTAL
            .with_label_values(&["redis", "list_all"])
            .inc();
    }
}
