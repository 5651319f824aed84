//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use crate::fanout::DeliveryReport;
use crate::redis::{CircuitState, RedisStatus};

use super::{
    BROADCAST_DURATION, BROADCAST_PASSES_TOTAL, BROADCAST_RECIPIENTS, DELIVERIES_TOTAL,
    HTTP_REQUESTS_TOTAL, LIFECYCLE_EVENTS_TOTAL, LIFECYCLE_RETRIES_TOTAL, LOCAL_CONNECTIONS,
    REDIS_CIRCUIT_BREAKER_STATE, REDIS_CONNECTION_STATUS, REGISTRY_CONNECTIONS,
    REGISTRY_ERRORS_TOTAL, REGISTRY_OPERATION_LATENCY, SOURCE_FETCHES_TOTAL, SOURCE_FETCH_LATENCY,
    STALE_REMOVAL_FAILURES_TOTAL, STALE_REMOVED_TOTAL, WS_CONNECTIONS_CLOSED,
    WS_CONNECTIONS_OPENED, WS_CONNECTION_DURATION,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Broadcast pass metrics
pub struct BroadcastMetrics;

impl BroadcastMetrics {
    pub fn record_pass(report: &DeliveryReport, duration: Duration) {
        BROADCAST_PASSES_TOTAL.with_label_values(&["ok"]).inc();
        BROADCAST_DURATION.observe(duration.as_secs_f64());
        BROADCAST_RECIPIENTS.observe(report.attempted as f64);

        DELIVERIES_TOTAL
            .with_label_values(&["delivered"])
            .inc_by(report.delivered_count as u64);
        DELIVERIES_TOTAL
            .with_label_values(&["gone"])
            .inc_by(report.stale_count as u64);

        let removed = report.stale_count.saturating_sub(report.removal_failures);
        STALE_REMOVED_TOTAL.inc_by(removed as u64);
        STALE_REMOVAL_FAILURES_TOTAL.inc_by(report.removal_failures as u64);
        REGISTRY_CONNECTIONS.set(report.attempted.saturating_sub(removed) as i64);
    }

    /// Record a kept connection's failure (timeout or transient)
    pub fn record_retained(outcome: &'static str) {
        DELIVERIES_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record a pass that aborted before any send
    pub fn record_aborted(reason: &'static str) {
        BROADCAST_PASSES_TOTAL.with_label_values(&[reason]).inc();
    }
}

/// Connect/disconnect metrics
pub struct LifecycleMetrics;

impl LifecycleMetrics {
    pub fn record_event(event: &'static str, outcome: &'static str) {
        LIFECYCLE_EVENTS_TOTAL
            .with_label_values(&[event, outcome])
            .inc();
    }

    pub fn record_retry(event: &'static str, result: &'static str) {
        LIFECYCLE_RETRIES_TOTAL
            .with_label_values(&[event, result])
            .inc();
    }
}

/// Local WebSocket connection metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened() {
        WS_CONNECTIONS_OPENED.inc();
        LOCAL_CONNECTIONS.inc();
    }

    pub fn record_closed(duration: Duration) {
        WS_CONNECTIONS_CLOSED.inc();
        LOCAL_CONNECTIONS.dec();
        WS_CONNECTION_DURATION.observe(duration.as_secs_f64());
    }
}

/// Registry backend and Redis health metrics
pub struct RegistryMetrics;

impl RegistryMetrics {
    pub fn record_operation(backend: &str, operation: &str, duration: Duration) {
        REGISTRY_OPERATION_LATENCY
            .with_label_values(&[backend, operation])
            .observe(duration.as_secs_f64());
    }

    pub fn record_error(backend: &str, operation: &str) {
        REGISTRY_ERRORS_TOTAL
            .with_label_values(&[backend, operation])
            .inc();
    }

    pub fn set_size(connections: usize) {
        REGISTRY_CONNECTIONS.set(connections as i64);
    }

    /// Sample the Redis gauges: 1/0 for connected, 0/1/2 for closed/open/half-open
    pub fn set_redis_status(status: RedisStatus, circuit_state: CircuitState) {
        REDIS_CONNECTION_STATUS.set(i64::from(status == RedisStatus::Connected));
        REDIS_CIRCUIT_BREAKER_STATE.set(circuit_state as i64);
    }
}

/// HTTP API metrics
pub struct HttpMetrics;

impl HttpMetrics {
    pub fn record_request(endpoint: &str, status: u16) {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&[endpoint, &status.to_string()])
            .inc();
    }
}

/// Upstream payload source metrics
pub struct SourceMetrics;

impl SourceMetrics {
    pub fn record_fetch(source: &str, ok: bool, duration: Duration) {
        let result = if ok { "ok" } else { "error" };
        SOURCE_FETCHES_TOTAL
            .with_label_values(&[source, result])
            .inc();
        SOURCE_FETCH_LATENCY.observe(duration.as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_helpers_do_not_panic() {
        BroadcastMetrics::record_pass(
            &DeliveryReport {
                attempted: 4,
                delivered_count: 2,
                stale_count: 1,
                transient_count: 1,
                removal_failures: 0,
            },
            Duration::from_millis(12),
        );
        BroadcastMetrics::record_retained("timeout");
        BroadcastMetrics::record_aborted("registry_unavailable");
        LifecycleMetrics::record_event("connect", "applied");
        LifecycleMetrics::record_retry("disconnect", "succeeded");
        RegistryMetrics::record_operation("memory", "upsert", Duration::from_micros(50));
        RegistryMetrics::record_error("redis", "list_all");
        RegistryMetrics::set_redis_status(RedisStatus::Connected, CircuitState::Closed);
        HttpMetrics::record_request("/api/v1/broadcast", 200);
        SourceMetrics::record_fetch("open-meteo", true, Duration::from_millis(300));
    }

    #[test]
    fn test_encoded_output_contains_broadcast_metrics() {
        BroadcastMetrics::record_aborted("payload_encoding");
        let output = encode_metrics().unwrap();
        assert!(output.contains("fanout_broadcast_passes_total"));
    }
}
