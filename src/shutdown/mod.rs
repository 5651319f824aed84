//! Graceful shutdown handling for the fanout service.
//!
//! 1. Tells every local WebSocket client to reconnect elsewhere
//! 2. Stops the background tasks (broadcast timer, lifecycle retries)
//! 3. Waits for local sockets to close so their disconnects reach the registry
//! 4. Deregisters any socket still open once the drain timeout expires

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::connection::ConnectionHub;
use crate::fanout::FanoutEngine;
use crate::websocket::OutboundMessage;

/// Configuration for graceful shutdown behavior
#[derive(Debug, Clone)]
pub struct ShutdownConfig {
    /// Time to wait for clients to be notified (default: 5 seconds)
    pub client_notification_timeout: Duration,
    /// Time to wait for local sockets to close (default: 10 seconds)
    pub drain_timeout: Duration,
    /// Suggested reconnect delay sent to clients (default: 5 seconds)
    pub reconnect_after_seconds: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            client_notification_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(10),
            reconnect_after_seconds: 5,
        }
    }
}

pub struct GracefulShutdown {
    hub: Arc<ConnectionHub>,
    engine: Arc<FanoutEngine>,
    shutdown_tx: broadcast::Sender<()>,
    config: ShutdownConfig,
}

impl GracefulShutdown {
    pub fn new(
        hub: Arc<ConnectionHub>,
        engine: Arc<FanoutEngine>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Self {
        Self::with_config(hub, engine, shutdown_tx, ShutdownConfig::default())
    }

    pub fn with_config(
        hub: Arc<ConnectionHub>,
        engine: Arc<FanoutEngine>,
        shutdown_tx: broadcast::Sender<()>,
        config: ShutdownConfig,
    ) -> Self {
        Self {
            hub,
            engine,
            shutdown_tx,
            config,
        }
    }

    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(local_connections = self.hub.len())
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = std::time::Instant::now();
        let mut result = ShutdownResult::default();

        tracing::info!(reason = %reason, "Starting graceful shutdown - Phase 1: Notifying clients");
        result.clients_notified = self.notify_clients(reason).await;

        tracing::info!("Phase 2: Signaling background tasks to stop");
        let _ = self.shutdown_tx.send(());

        tracing::info!("Phase 3: Waiting for connections to close");
        result.connections_closed = self.wait_for_connections_to_close().await;

        tracing::info!("Phase 4: Deregistering remaining connections");
        result.connections_deregistered = self.deregister_remaining().await;

        result.duration = start.elapsed();
        result.success = true;

        tracing::info!(
            clients_notified = result.clients_notified,
            connections_closed = result.connections_closed,
            connections_deregistered = result.connections_deregistered,
            duration_ms = result.duration.as_millis() as u64,
            "Graceful shutdown completed"
        );

        result
    }

    async fn notify_clients(&self, reason: &str) -> usize {
        let senders = self.hub.senders();
        if senders.is_empty() {
            return 0;
        }

        let message = OutboundMessage::Shutdown {
            reason: reason.to_string(),
            reconnect_after_seconds: self.config.reconnect_after_seconds,
        };

        let mut futures = FuturesUnordered::new();
        for (id, sender) in senders {
            let msg = message.clone();
            futures.push(async move {
                match timeout(Duration::from_secs(2), sender.send(msg)).await {
                    Ok(Ok(())) => true,
                    Ok(Err(_)) => {
                        tracing::debug!(connection_id = %id, "Socket closed before shutdown notice");
                        false
                    }
                    Err(_) => {
                        tracing::debug!(connection_id = %id, "Timeout sending shutdown notice");
                        false
                    }
                }
            });
        }

        let mut notified = 0;
        let notify_future = async {
            while let Some(success) = futures.next().await {
                if success {
                    notified += 1;
                }
            }
        };
        let _ = timeout(self.config.client_notification_timeout, notify_future).await;

        tracing::info!(notified, "Shutdown notices sent");
        notified
    }

    async fn wait_for_connections_to_close(&self) -> usize {
        let initial = self.hub.len();
        if initial == 0 {
            return 0;
        }

        let wait_future = async {
            while !self.hub.is_empty() {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };
        let _ = timeout(self.config.drain_timeout, wait_future).await;

        let remaining = self.hub.len();
        if remaining > 0 {
            tracing::warn!(
                remaining_connections = remaining,
                "Some connections did not close gracefully"
            );
        }

        initial.saturating_sub(remaining)
    }

    /// Remove sockets that outlived the drain from the hub and the registry
    async fn deregister_remaining(&self) -> usize {
        let remaining: Vec<_> = self.hub.senders().into_iter().map(|(id, _)| id).collect();

        for id in &remaining {
            self.hub.detach(id);
            self.engine.on_disconnect(id).await;
        }
        remaining.len()
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    pub success: bool,
    pub clients_notified: usize,
    pub connections_closed: usize,
    /// Sockets still open after the drain, removed from the registry
    pub connections_deregistered: usize,
    pub duration: Duration,
}
