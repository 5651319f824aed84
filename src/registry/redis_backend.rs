//! Redis-backed connection registry.
//!
//! Members live in a single Redis set `{prefix}:{namespace}`. `SADD` and
//! `SREM` are atomic per member and already idempotent, so upsert and remove
//! map onto them directly.

use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::ConnectionId;
use crate::redis::{RedisPool, RedisPoolExt};

use super::backend::{ConnectionRegistry, RegistryError, RegistryStats};

pub struct RedisConnectionRegistry {
    pool: Arc<RedisPool>,
    prefix: String,
    namespace: String,
}

impl RedisConnectionRegistry {
    pub fn new(pool: Arc<RedisPool>, prefix: String) -> Self {
        Self::with_namespace(pool, prefix, "default".to_string())
    }

    pub fn with_namespace(pool: Arc<RedisPool>, prefix: String, namespace: String) -> Self {
        Self {
            pool,
            prefix,
            namespace,
        }
    }

    fn set_key(&self) -> String {
        format!("{}:{}", self.prefix, self.namespace)
    }
}

#[async_trait]
impl ConnectionRegistry for RedisConnectionRegistry {
    async fn upsert(&self, id: &ConnectionId) -> Result<(), RegistryError> {
        let added = self.pool.sadd(&self.set_key(), id.as_str()).await?;
        tracing::debug!(connection_id = %id, added = added, "Connection upserted in Redis");
        Ok(())
    }

    async fn remove(&self, id: &ConnectionId) -> Result<(), RegistryError> {
        let removed = self.pool.srem(&self.set_key(), id.as_str()).await?;
        tracing::debug!(connection_id = %id, removed = removed, "Connection removed from Redis");
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<ConnectionId>, RegistryError> {
        let members = self.pool.smembers(&self.set_key()).await?;
        Ok(members.into_iter().map(ConnectionId::from).collect())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn stats(&self) -> RegistryStats {
        RegistryStats {
            backend_type: self.backend_name().to_string(),
            connections: self.pool.scard(&self.set_key()).await.ok(),
        }
    }
}
