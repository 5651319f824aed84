//! Broadcast fan-out engine.
//!
//! A broadcast pass lists every registered connection once, attempts a send
//! to each of them under a per-send deadline, and only then removes the
//! connections whose channel reported them gone. Sends never wait on
//! removals and no registry write happens while sends are in flight.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant as StdInstant};

use futures::stream::{self, FuturesUnordered, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

use crate::config::FanoutConfig;
use crate::connection::{ConnectionEnvelope, ConnectionId};
use crate::delivery::{DeliveryChannel, DeliveryError};
use crate::metrics::{BroadcastMetrics, LifecycleMetrics, RegistryMetrics};
use crate::registry::{ConnectionRegistry, RegistryError};

use super::lifecycle::{LifecycleOutcome, LifecycleWrite};
use super::payload::{Payload, PayloadError};
use super::report::{DeliveryReport, FanoutStats, FanoutStatsSnapshot};

/// Errors that abort a whole broadcast pass
#[derive(Debug, Error)]
pub enum FanoutError {
    /// The registry could not be listed; nothing was sent
    #[error("Connection registry unavailable: {0}")]
    RegistryUnavailable(#[from] RegistryError),

    /// The payload could not be encoded; nothing was sent
    #[error("Payload encoding failed: {0}")]
    PayloadEncoding(#[from] PayloadError),
}

/// Tuning for the send phase
#[derive(Debug, Clone)]
pub struct FanoutOptions {
    /// Upper bound on sends in flight at once
    pub max_concurrent_sends: usize,
    /// Deadline applied to each individual send
    pub send_timeout: Duration,
}

impl Default for FanoutOptions {
    fn default() -> Self {
        Self::from(&FanoutConfig::default())
    }
}

impl From<&FanoutConfig> for FanoutOptions {
    fn from(config: &FanoutConfig) -> Self {
        Self {
            max_concurrent_sends: config.max_concurrent_sends.max(1),
            send_timeout: Duration::from_millis(config.send_timeout_ms),
        }
    }
}

pub struct FanoutEngine {
    registry: Arc<dyn ConnectionRegistry>,
    channel: Arc<dyn DeliveryChannel>,
    options: FanoutOptions,
    retry_tx: Option<mpsc::Sender<LifecycleWrite>>,
    stats: FanoutStats,
}

impl FanoutEngine {
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        channel: Arc<dyn DeliveryChannel>,
        options: FanoutOptions,
    ) -> Self {
        Self {
            registry,
            channel,
            options,
            retry_tx: None,
            stats: FanoutStats::default(),
        }
    }

    /// Queue failed lifecycle writes on `retry_tx` instead of dropping them
    pub fn with_retry_queue(mut self, retry_tx: mpsc::Sender<LifecycleWrite>) -> Self {
        self.retry_tx = Some(retry_tx);
        self
    }

    pub fn registry(&self) -> &Arc<dyn ConnectionRegistry> {
        &self.registry
    }

    pub fn channel_name(&self) -> &'static str {
        self.channel.channel_name()
    }

    pub fn stats(&self) -> FanoutStatsSnapshot {
        self.stats.snapshot()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Record a newly opened connection.
    ///
    /// Never fails: a registry error is logged and, when a retry queue is
    /// configured, the upsert is retried out of band.
    pub async fn on_connect(&self, id: &ConnectionId) -> LifecycleOutcome {
        self.stats.connects.fetch_add(1, Ordering::Relaxed);
        self.apply_lifecycle(LifecycleWrite::Upsert(id.clone()))
            .await
    }

    /// Record a closed connection. Same failure policy as [`Self::on_connect`].
    pub async fn on_disconnect(&self, id: &ConnectionId) -> LifecycleOutcome {
        self.stats.disconnects.fetch_add(1, Ordering::Relaxed);
        self.apply_lifecycle(LifecycleWrite::Remove(id.clone()))
            .await
    }

    /// Connect event from an external gateway; malformed events are ignored.
    pub async fn on_connect_event(&self, event: &serde_json::Value) -> LifecycleOutcome {
        match ConnectionEnvelope::from_value(event) {
            Some(envelope) => self.on_connect(&envelope.id).await,
            None => self.ignore_event("connect"),
        }
    }

    /// Disconnect event from an external gateway; malformed events are ignored.
    pub async fn on_disconnect_event(&self, event: &serde_json::Value) -> LifecycleOutcome {
        match ConnectionEnvelope::from_value(event) {
            Some(envelope) => self.on_disconnect(&envelope.id).await,
            None => self.ignore_event("disconnect"),
        }
    }

    fn ignore_event(&self, event: &'static str) -> LifecycleOutcome {
        tracing::warn!(event, "Lifecycle event without connection id ignored");
        LifecycleMetrics::record_event(event, LifecycleOutcome::Ignored.as_str());
        LifecycleOutcome::Ignored
    }

    async fn apply_lifecycle(&self, write: LifecycleWrite) -> LifecycleOutcome {
        let event = write.event();
        let started = StdInstant::now();
        let result = write.apply(self.registry.as_ref()).await;
        let operation = match write {
            LifecycleWrite::Upsert(_) => "upsert",
            LifecycleWrite::Remove(_) => "remove",
        };
        RegistryMetrics::record_operation(
            self.registry.backend_name(),
            operation,
            started.elapsed(),
        );

        let outcome = match result {
            Ok(()) => {
                tracing::debug!(connection_id = %write.connection_id(), event, "Registry updated");
                LifecycleOutcome::Applied
            }
            Err(e) => {
                self.stats.lifecycle_failures.fetch_add(1, Ordering::Relaxed);
                RegistryMetrics::record_error(self.registry.backend_name(), operation);
                tracing::warn!(
                    connection_id = %write.connection_id(),
                    event,
                    error = %e,
                    "Registry write failed, transport continues"
                );
                self.schedule_retry(write)
            }
        };

        LifecycleMetrics::record_event(event, outcome.as_str());
        outcome
    }

    fn schedule_retry(&self, write: LifecycleWrite) -> LifecycleOutcome {
        let Some(tx) = &self.retry_tx else {
            return LifecycleOutcome::Dropped;
        };

        match tx.try_send(write) {
            Ok(()) => LifecycleOutcome::RetryScheduled,
            Err(mpsc::error::TrySendError::Full(write)) => {
                tracing::error!(
                    connection_id = %write.connection_id(),
                    event = write.event(),
                    "Lifecycle retry queue full, write dropped"
                );
                LifecycleOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(write)) => {
                tracing::error!(
                    connection_id = %write.connection_id(),
                    event = write.event(),
                    "Lifecycle retry queue closed, write dropped"
                );
                LifecycleOutcome::Dropped
            }
        }
    }

    // ========================================================================
    // Broadcast
    // ========================================================================

    /// Encode `message` as JSON and broadcast it.
    ///
    /// An encoding failure aborts before the registry is touched.
    pub async fn broadcast_message<T: Serialize + ?Sized>(
        &self,
        message: &T,
    ) -> Result<DeliveryReport, FanoutError> {
        let payload = match Payload::json(message) {
            Ok(payload) => payload,
            Err(e) => {
                self.stats.failed_passes.fetch_add(1, Ordering::Relaxed);
                BroadcastMetrics::record_aborted("payload_encoding");
                tracing::error!(error = %e, "Broadcast aborted: payload encoding failed");
                return Err(e.into());
            }
        };
        self.broadcast(&payload).await
    }

    /// Deliver `payload` to every registered connection.
    ///
    /// Fails only when the registry cannot be listed. Per-connection
    /// failures are reported in the [`DeliveryReport`]; only connections
    /// reported gone are removed, and only after every send has finished.
    #[tracing::instrument(
        name = "fanout.broadcast",
        skip(self, payload),
        fields(payload_bytes = payload.len(), channel = self.channel.channel_name())
    )]
    pub async fn broadcast(&self, payload: &Payload) -> Result<DeliveryReport, FanoutError> {
        let started = StdInstant::now();

        let list_started = StdInstant::now();
        let ids = match self.registry.list_all().await {
            Ok(ids) => ids,
            Err(e) => {
                self.stats.failed_passes.fetch_add(1, Ordering::Relaxed);
                RegistryMetrics::record_error(self.registry.backend_name(), "list_all");
                BroadcastMetrics::record_aborted("registry_unavailable");
                tracing::error!(error = %e, "Broadcast aborted: registry unavailable");
                return Err(e.into());
            }
        };
        RegistryMetrics::record_operation(
            self.registry.backend_name(),
            "list_all",
            list_started.elapsed(),
        );

        let mut report = DeliveryReport {
            attempted: ids.len(),
            ..DeliveryReport::empty()
        };

        if ids.is_empty() {
            tracing::debug!("No registered connections, nothing to send");
            self.finish_pass(&report, started.elapsed());
            return Ok(report);
        }

        // Phase 1: attempt every connection, bounded by max_concurrent_sends
        let stale = self.send_all(ids, payload, &mut report).await;
        report.stale_count = stale.len();

        // Phase 2: evict the connections reported gone
        if !stale.is_empty() {
            report.removal_failures = self.remove_stale(stale).await;
        }

        self.finish_pass(&report, started.elapsed());
        Ok(report)
    }

    /// Send to every id and return the ids whose channel reported them gone.
    async fn send_all(
        &self,
        ids: Vec<ConnectionId>,
        payload: &Payload,
        report: &mut DeliveryReport,
    ) -> Vec<ConnectionId> {
        let max_in_flight = self.options.max_concurrent_sends.max(1);
        let mut in_flight = FuturesUnordered::new();
        let mut stale = Vec::new();

        for id in ids {
            in_flight.push(self.attempt(id, payload));

            // Drain completed sends while at the concurrency limit
            while in_flight.len() >= max_in_flight {
                match in_flight.next().await {
                    Some((id, result)) => Self::classify(id, result, report, &mut stale),
                    None => break,
                }
            }
        }

        while let Some((id, result)) = in_flight.next().await {
            Self::classify(id, result, report, &mut stale);
        }

        stale
    }

    async fn attempt(
        &self,
        id: ConnectionId,
        payload: &Payload,
    ) -> (ConnectionId, Result<(), DeliveryError>) {
        let deadline = Instant::now() + self.options.send_timeout;
        // Channels should honor the deadline themselves; this bounds the ones that don't
        let result = timeout_at(deadline, self.channel.send(&id, payload, deadline))
            .await
            .unwrap_or(Err(DeliveryError::Timeout));
        (id, result)
    }

    fn classify(
        id: ConnectionId,
        result: Result<(), DeliveryError>,
        report: &mut DeliveryReport,
        stale: &mut Vec<ConnectionId>,
    ) {
        match result {
            Ok(()) => report.delivered_count += 1,
            Err(DeliveryError::Gone) => {
                tracing::debug!(connection_id = %id, "Connection gone, scheduling removal");
                stale.push(id);
            }
            Err(DeliveryError::Timeout) => {
                report.transient_count += 1;
                BroadcastMetrics::record_retained("timeout");
                tracing::warn!(connection_id = %id, "Send timed out, connection kept");
            }
            Err(DeliveryError::Transient(reason)) => {
                report.transient_count += 1;
                BroadcastMetrics::record_retained("transient");
                tracing::warn!(connection_id = %id, reason = %reason, "Send failed, connection kept");
            }
        }
    }

    /// Remove stale ids concurrently and return how many removals failed.
    async fn remove_stale(&self, stale: Vec<ConnectionId>) -> usize {
        let backend = self.registry.backend_name();
        // Each removal owns its id and registry handle so the pass future stays spawnable
        let results: Vec<(ConnectionId, Result<(), RegistryError>)> = stream::iter(stale)
            .map(|id| {
                let registry = Arc::clone(&self.registry);
                async move {
                    let result = registry.remove(&id).await;
                    (id, result)
                }
            })
            .buffer_unordered(self.options.max_concurrent_sends.max(1))
            .collect()
            .await;

        let mut failures = 0;
        for (id, result) in results {
            if let Err(e) = result {
                failures += 1;
                RegistryMetrics::record_error(backend, "remove");
                tracing::warn!(
                    connection_id = %id,
                    error = %e,
                    "Failed to remove stale connection, will retry next pass"
                );
            }
        }
        failures
    }

    fn finish_pass(&self, report: &DeliveryReport, elapsed: Duration) {
        self.stats.record_pass(report);
        BroadcastMetrics::record_pass(report, elapsed);
        tracing::info!(
            attempted = report.attempted,
            delivered = report.delivered_count,
            stale = report.stale_count,
            transient = report.transient_count,
            removal_failures = report.removal_failures,
            elapsed_ms = elapsed.as_millis() as u64,
            "Broadcast pass complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryConnectionRegistry;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Channel that answers from a fixed script; unknown ids succeed
    struct ScriptedChannel {
        script: HashMap<String, DeliveryError>,
        sent: Mutex<Vec<ConnectionId>>,
    }

    impl ScriptedChannel {
        fn new(script: &[(&str, DeliveryError)]) -> Self {
            Self {
                script: script
                    .iter()
                    .map(|(id, e)| (id.to_string(), e.clone()))
                    .collect(),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl DeliveryChannel for ScriptedChannel {
        async fn send(
            &self,
            id: &ConnectionId,
            _payload: &Payload,
            _deadline: Instant,
        ) -> Result<(), DeliveryError> {
            self.sent.lock().unwrap().push(id.clone());
            match self.script.get(id.as_str()) {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }

        fn channel_name(&self) -> &'static str {
            "scripted"
        }
    }

    async fn registry_with(ids: &[&str]) -> Arc<MemoryConnectionRegistry> {
        let registry = Arc::new(MemoryConnectionRegistry::new());
        for id in ids {
            registry.upsert(&ConnectionId::from(*id)).await.unwrap();
        }
        registry
    }

    fn payload() -> Payload {
        Payload::json(&serde_json::json!({"type": "weather", "data": {"temp_c": 12.5}})).unwrap()
    }

    #[tokio::test]
    async fn test_all_delivered() {
        let registry = registry_with(&["c1", "c2", "c3"]).await;
        let engine = FanoutEngine::new(
            registry.clone(),
            Arc::new(ScriptedChannel::new(&[])),
            FanoutOptions::default(),
        );

        let report = engine.broadcast(&payload()).await.unwrap();
        assert_eq!(report.delivered_count, 3);
        assert_eq!(report.stale_count, 0);
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn test_gone_connection_removed_after_sends() {
        let registry = registry_with(&["c1", "c2", "c3"]).await;
        let channel = Arc::new(ScriptedChannel::new(&[("c2", DeliveryError::Gone)]));
        let engine = FanoutEngine::new(registry.clone(), channel.clone(), FanoutOptions::default());

        let report = engine.broadcast(&payload()).await.unwrap();
        assert_eq!(report.delivered_count, 2);
        assert_eq!(report.stale_count, 1);
        assert_eq!(channel.sent.lock().unwrap().len(), 3);
        assert!(!registry.contains(&ConnectionId::from("c2")));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_pass_with_removals_runs_on_spawned_task() {
        let registry = registry_with(&["c1", "c2"]).await;
        let channel = Arc::new(ScriptedChannel::new(&[("c1", DeliveryError::Gone)]));
        let engine = Arc::new(FanoutEngine::new(
            registry.clone(),
            channel,
            FanoutOptions::default(),
        ));

        let task_engine = engine.clone();
        let report = tokio::spawn(async move { task_engine.broadcast(&payload()).await })
            .await
            .unwrap()
            .unwrap();

        assert_eq!(report.stale_count, 1);
        assert_eq!(report.removal_failures, 0);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_keep_connection() {
        let registry = registry_with(&["c1", "c2", "c3"]).await;
        let channel = Arc::new(ScriptedChannel::new(&[
            ("c1", DeliveryError::Timeout),
            ("c3", DeliveryError::Transient("status 500".to_string())),
        ]));
        let engine = FanoutEngine::new(registry.clone(), channel, FanoutOptions::default());

        let report = engine.broadcast(&payload()).await.unwrap();
        assert_eq!(report.delivered_count, 1);
        assert_eq!(report.stale_count, 0);
        assert_eq!(report.transient_count, 2);
        assert_eq!(registry.len(), 3);
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let registry = registry_with(&[]).await;
        let channel = Arc::new(ScriptedChannel::new(&[]));
        let engine = FanoutEngine::new(registry, channel.clone(), FanoutOptions::default());

        let report = engine.broadcast(&payload()).await.unwrap();
        assert_eq!(report, DeliveryReport::empty());
        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unencodable_message_sends_nothing() {
        struct Unencodable;
        impl Serialize for Unencodable {
            fn serialize<S: serde::Serializer>(&self, _: S) -> Result<S::Ok, S::Error> {
                Err(serde::ser::Error::custom("refused"))
            }
        }

        let registry = registry_with(&["c1"]).await;
        let channel = Arc::new(ScriptedChannel::new(&[]));
        let engine = FanoutEngine::new(registry, channel.clone(), FanoutOptions::default());

        let result = engine.broadcast_message(&Unencodable).await;
        assert!(matches!(result, Err(FanoutError::PayloadEncoding(_))));
        assert!(channel.sent.lock().unwrap().is_empty());
        assert_eq!(engine.stats().failed_passes, 1);
    }

    #[tokio::test]
    async fn test_lifecycle_round_trip() {
        let registry = registry_with(&[]).await;
        let engine = FanoutEngine::new(
            registry.clone(),
            Arc::new(ScriptedChannel::new(&[])),
            FanoutOptions::default(),
        );
        let id = ConnectionId::from("c1");

        assert_eq!(engine.on_connect(&id).await, LifecycleOutcome::Applied);
        assert!(registry.contains(&id));
        assert_eq!(engine.on_disconnect(&id).await, LifecycleOutcome::Applied);
        assert!(!registry.contains(&id));

        let stats = engine.stats();
        assert_eq!(stats.connects, 1);
        assert_eq!(stats.disconnects, 1);
    }

    #[tokio::test]
    async fn test_connect_event_without_id_is_ignored() {
        let registry = registry_with(&[]).await;
        let engine = FanoutEngine::new(
            registry.clone(),
            Arc::new(ScriptedChannel::new(&[])),
            FanoutOptions::default(),
        );

        let outcome = engine
            .on_connect_event(&serde_json::json!({"requestContext": {}}))
            .await;
        assert_eq!(outcome, LifecycleOutcome::Ignored);
        assert!(registry.is_empty());

        let outcome = engine
            .on_connect_event(&serde_json::json!({"requestContext": {"connectionId": "abc="}}))
            .await;
        assert_eq!(outcome, LifecycleOutcome::Applied);
        assert!(registry.contains(&ConnectionId::from("abc=")));
    }

    #[test]
    fn test_options_from_config() {
        let options = FanoutOptions::from(&FanoutConfig {
            max_concurrent_sends: 0,
            send_timeout_ms: 250,
            ..FanoutConfig::default()
        });
        assert_eq!(options.max_concurrent_sends, 1);
        assert_eq!(options.send_timeout, Duration::from_millis(250));
    }
}
