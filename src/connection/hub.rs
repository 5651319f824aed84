use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::websocket::OutboundMessage;

use super::ConnectionId;

/// Outbound side of a socket accepted by this process
pub struct LocalConnection {
    pub sender: mpsc::Sender<OutboundMessage>,
    pub connected_at: DateTime<Utc>,
}

/// Sockets currently held open by the embedded WebSocket transport.
///
/// This is transport state, not the registry: the hub answers "can this
/// process still push to that id", which is what the local delivery channel
/// needs to tell a live connection from a gone one.
pub struct ConnectionHub {
    connections: DashMap<ConnectionId, LocalConnection>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub fn attach(&self, id: ConnectionId, sender: mpsc::Sender<OutboundMessage>) {
        tracing::debug!(connection_id = %id, "Socket attached to hub");
        self.connections.insert(
            id,
            LocalConnection {
                sender,
                connected_at: Utc::now(),
            },
        );
    }

    pub fn detach(&self, id: &ConnectionId) -> bool {
        let removed = self.connections.remove(id).is_some();
        if removed {
            tracing::debug!(connection_id = %id, "Socket detached from hub");
        }
        removed
    }

    /// Sender for a connection, if the socket is still held here.
    pub fn sender(&self, id: &ConnectionId) -> Option<mpsc::Sender<OutboundMessage>> {
        self.connections.get(id).map(|c| c.sender.clone())
    }

    /// Snapshot of every attached socket's sender
    pub fn senders(&self) -> Vec<(ConnectionId, mpsc::Sender<OutboundMessage>)> {
        self.connections
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().sender.clone()))
            .collect()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn stats(&self) -> HubStats {
        let oldest_connected_at = self
            .connections
            .iter()
            .map(|entry| entry.value().connected_at)
            .min();

        HubStats {
            local_connections: self.connections.len(),
            oldest_connected_at,
        }
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HubStats {
    pub local_connections: usize,
    pub oldest_connected_at: Option<DateTime<Utc>>,
}
