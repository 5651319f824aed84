//! Shared Redis connection for the registry backend.
//!
//! Wraps one multiplexed connection behind the circuit breaker. Every command
//! records its outcome so a dead Redis trips the breaker and later calls fail
//! fast with `PoolError::CircuitOpen`. Connecting and each command round trip
//! are bounded by `redis.connect_timeout_ms` and `redis.response_timeout_ms`.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError, RedisResult};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::RedisConfig;

use super::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Circuit breaker is open")]
    CircuitOpen,
}

/// Reachability of the registry store as reported on `/health`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedisStatus {
    Connected,
    /// Never connected yet, or the last connection dropped
    Disconnected,
    CircuitOpen,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedisPoolStats {
    pub status: RedisStatus,
    pub circuit_breaker_state: &'static str,
    pub circuit_breaker_failures: u32,
    /// Successful (re)connects since startup
    pub connects: u32,
}

pub struct RedisPool {
    client: Client,
    connection: RwLock<Option<MultiplexedConnection>>,
    connected: AtomicBool,
    connects: AtomicU32,
    circuit_breaker: Arc<CircuitBreaker>,
    config: RedisConfig,
}

impl RedisPool {
    pub fn new(config: RedisConfig, circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, PoolError> {
        let client = Client::open(config.url.as_str())?;

        Ok(Self {
            client,
            connection: RwLock::new(None),
            connected: AtomicBool::new(false),
            connects: AtomicU32::new(0),
            circuit_breaker,
            config,
        })
    }

    /// Build a pool with its own breaker from settings.
    pub fn from_config(config: &RedisConfig) -> Result<Self, PoolError> {
        let circuit_breaker = Arc::new(CircuitBreaker::with_config(CircuitBreakerConfig::from(
            config,
        )));
        Self::new(config.clone(), circuit_breaker)
    }

    /// Get the shared connection, connecting lazily.
    pub async fn get_connection(&self) -> Result<MultiplexedConnection, PoolError> {
        if !self.circuit_breaker.allow_request() {
            return Err(PoolError::CircuitOpen);
        }

        {
            let conn = self.connection.read().await;
            if let Some(ref c) = *conn {
                return Ok(c.clone());
            }
        }

        self.connect().await
    }

    async fn connect(&self) -> Result<MultiplexedConnection, PoolError> {
        let mut conn_guard = self.connection.write().await;

        // Another task may have connected while we waited for the lock
        if let Some(ref c) = *conn_guard {
            return Ok(c.clone());
        }

        // Bounded so a blackholed host cannot hold the write lock for the OS TCP timeout
        let result = self
            .client
            .get_multiplexed_async_connection_with_timeouts(
                Duration::from_millis(self.config.response_timeout_ms),
                Duration::from_millis(self.config.connect_timeout_ms),
            )
            .await;

        match result {
            Ok(conn) => {
                *conn_guard = Some(conn.clone());
                self.connected.store(true, Ordering::Release);
                self.connects.fetch_add(1, Ordering::AcqRel);
                self.circuit_breaker.record_success();
                tracing::info!(url = %self.config.url, "Redis connection established");
                Ok(conn)
            }
            Err(e) => {
                self.circuit_breaker.record_failure();
                tracing::error!(error = %e, "Failed to connect to Redis");
                Err(PoolError::Redis(e))
            }
        }
    }

    /// Run a command, recording the outcome on the circuit breaker.
    ///
    /// Dropped connections are discarded so the next call reconnects.
    pub async fn execute<F, T, Fut>(&self, f: F) -> Result<T, PoolError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let conn = self.get_connection().await?;

        match f(conn).await {
            Ok(result) => {
                self.circuit_breaker.record_success();
                Ok(result)
            }
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() || e.is_timeout() {
                    *self.connection.write().await = None;
                    self.connected.store(false, Ordering::Release);
                }
                self.circuit_breaker.record_failure();
                Err(PoolError::Redis(e))
            }
        }
    }

    pub fn status(&self) -> RedisStatus {
        if self.circuit_breaker.state() == CircuitState::Open {
            RedisStatus::CircuitOpen
        } else if self.connected.load(Ordering::Acquire) {
            RedisStatus::Connected
        } else {
            RedisStatus::Disconnected
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status() == RedisStatus::Connected
    }

    pub fn stats(&self) -> RedisPoolStats {
        let breaker = self.circuit_breaker.stats();
        RedisPoolStats {
            status: self.status(),
            circuit_breaker_state: breaker.state.as_str(),
            circuit_breaker_failures: breaker.failure_count,
            connects: self.connects.load(Ordering::Acquire),
        }
    }

    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.circuit_breaker
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub async fn ping(&self) -> Result<(), PoolError> {
        let _pong: String = self
            .execute(|mut conn| async move { redis::cmd("PING").query_async(&mut conn).await })
            .await?;
        Ok(())
    }
}

/// Set commands backing the connection registry.
#[async_trait::async_trait]
pub trait RedisPoolExt {
    /// Add a member to a set, returns true if it was not present.
    async fn sadd(&self, key: &str, member: &str) -> Result<bool, PoolError>;

    /// Remove a member from a set, returns true if it was present.
    async fn srem(&self, key: &str, member: &str) -> Result<bool, PoolError>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>, PoolError>;

    async fn scard(&self, key: &str) -> Result<usize, PoolError>;
}

#[async_trait::async_trait]
impl RedisPoolExt for RedisPool {
    async fn sadd(&self, key: &str, member: &str) -> Result<bool, PoolError> {
        let added: usize = self
            .execute(|mut conn| async move { conn.sadd(key, member).await })
            .await?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool, PoolError> {
        let removed: usize = self
            .execute(|mut conn| async move { conn.srem(key, member).await })
            .await?;
        Ok(removed > 0)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>, PoolError> {
        self.execute(|mut conn| async move { conn.smembers(key).await })
            .await
    }

    async fn scard(&self, key: &str) -> Result<usize, PoolError> {
        self.execute(|mut conn| async move { conn.scard(key).await })
            .await
    }
}
