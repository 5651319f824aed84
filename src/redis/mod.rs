//! Redis access for the durable connection registry
//!
//! - `CircuitBreaker`: stops hammering Redis while it is down
//! - `ExponentialBackoff`: retry delays for out-of-band lifecycle writes
//! - `RedisPool`: multiplexed connection with set commands used by the
//!   registry; owns the reachability status reported on `/health`

mod backoff;
mod circuit_breaker;
pub mod pool;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStats, CircuitState};
pub use pool::{PoolError, RedisPool, RedisPoolExt, RedisPoolStats, RedisStatus};

/// Get current time in milliseconds since epoch
pub(crate) fn current_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
