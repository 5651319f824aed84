//! In-memory registry backend using DashMap.
//!
//! Contents are lost on restart; suitable for a single process that also
//! owns the sockets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::connection::ConnectionId;

use super::backend::{ConnectionRegistry, RegistryError, RegistryStats};

pub struct MemoryConnectionRegistry {
    /// connection id -> first registration time
    connections: DashMap<ConnectionId, DateTime<Utc>>,
}

impl MemoryConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn registered_at(&self, id: &ConnectionId) -> Option<DateTime<Utc>> {
        self.connections.get(id).map(|entry| *entry.value())
    }
}

impl Default for MemoryConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionRegistry for MemoryConnectionRegistry {
    async fn upsert(&self, id: &ConnectionId) -> Result<(), RegistryError> {
        // Keep the original registration time on repeated connects
        self.connections.entry(id.clone()).or_insert_with(Utc::now);
        Ok(())
    }

    async fn remove(&self, id: &ConnectionId) -> Result<(), RegistryError> {
        self.connections.remove(id);
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<ConnectionId>, RegistryError> {
        Ok(self.connections.iter().map(|entry| entry.key().clone()).collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn stats(&self) -> RegistryStats {
        RegistryStats {
            backend_type: self.backend_name().to_string(),
            connections: Some(self.connections.len()),
        }
    }
}
