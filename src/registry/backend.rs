//! Backend trait for the connection registry.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::connection::ConnectionId;
use crate::redis::PoolError;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The backing store cannot be reached
    #[error("Registry unavailable: {0}")]
    Unavailable(String),
}

impl From<PoolError> for RegistryError {
    fn from(err: PoolError) -> Self {
        RegistryError::Unavailable(err.to_string())
    }
}

/// Statistics about the registry backend.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub backend_type: String,
    /// Current member count, `None` when the store could not be asked
    pub connections: Option<usize>,
}

/// Durable, idempotent set of open connection ids.
///
/// Single-key operations must be atomic in the backing store; nothing here
/// needs multi-key transactions. Implementations are shared across tasks and
/// called concurrently by lifecycle events and broadcast passes.
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Insert `id`; a no-op if it is already present.
    async fn upsert(&self, id: &ConnectionId) -> Result<(), RegistryError>;

    /// Delete `id`; a no-op if it is absent.
    async fn remove(&self, id: &ConnectionId) -> Result<(), RegistryError>;

    /// Snapshot of the current members in no particular order.
    ///
    /// Must fail rather than return an empty list when the store is down.
    async fn list_all(&self) -> Result<Vec<ConnectionId>, RegistryError>;

    /// Backend identifier for health and stats output
    fn backend_name(&self) -> &'static str;

    async fn stats(&self) -> RegistryStats {
        RegistryStats {
            backend_type: self.backend_name().to_string(),
            connections: self.list_all().await.ok().map(|ids| ids.len()),
        }
    }
}
