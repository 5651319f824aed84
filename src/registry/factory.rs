//! Registry backend factory

use std::sync::Arc;

use crate::config::RegistryConfig;
use crate::redis::RedisPool;

use super::backend::ConnectionRegistry;
use super::memory_backend::MemoryConnectionRegistry;
use super::redis_backend::RedisConnectionRegistry;

/// Create a registry backend based on configuration.
///
/// - `"redis"`: `RedisConnectionRegistry` if a pool is provided
/// - `"memory"` (default): `MemoryConnectionRegistry`
///
/// A Redis request without a pool falls back to memory with a warning.
pub fn create_registry(
    settings: &RegistryConfig,
    redis_pool: Option<Arc<RedisPool>>,
) -> Arc<dyn ConnectionRegistry> {
    match settings.backend.as_str() {
        "redis" => {
            if let Some(pool) = redis_pool {
                tracing::info!(
                    backend = "redis",
                    prefix = %settings.redis_prefix,
                    namespace = %settings.namespace,
                    "Creating Redis connection registry"
                );
                Arc::new(RedisConnectionRegistry::with_namespace(
                    pool,
                    settings.redis_prefix.clone(),
                    settings.namespace.clone(),
                ))
            } else {
                tracing::warn!(
                    "Redis registry requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryConnectionRegistry::new())
            }
        }
        other => {
            if other != "memory" {
                tracing::warn!(backend = %other, "Unknown registry backend, using memory");
            }
            tracing::info!(backend = "memory", "Creating memory connection registry");
            Arc::new(MemoryConnectionRegistry::new())
        }
    }
}
