//! Circuit breaker guarding registry calls to Redis

use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU8, Ordering};

use crate::config::RedisConfig;

use super::current_time_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    /// Requests flow through
    Closed = 0,
    /// Requests are rejected without touching Redis
    Open = 1,
    /// Trial requests are let through
    HalfOpen = 2,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    /// Time an open circuit waits before allowing a trial request (ms)
    pub reset_timeout_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            reset_timeout_ms: 30_000,
        }
    }
}

impl From<&RedisConfig> for CircuitBreakerConfig {
    fn from(config: &RedisConfig) -> Self {
        Self {
            failure_threshold: config.circuit_breaker_failure_threshold,
            success_threshold: config.circuit_breaker_success_threshold,
            reset_timeout_ms: config.circuit_breaker_reset_timeout_seconds * 1000,
        }
    }
}

/// Lock-free circuit breaker.
///
/// A registry backed by an unreachable Redis should fail fast with
/// `RegistryUnavailable` instead of stalling every lifecycle event and
/// broadcast pass on connect timeouts.
pub struct CircuitBreaker {
    state: AtomicU8,
    failure_count: AtomicU32,
    success_count: AtomicU32,
    last_state_change: AtomicI64,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            last_state_change: AtomicI64::new(current_time_ms()),
            config,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.maybe_half_open();
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    pub fn allow_request(&self) -> bool {
        self.state() != CircuitState::Open
    }

    pub fn record_success(&self) {
        match CircuitState::from(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => self.failure_count.store(0, Ordering::Release),
            CircuitState::HalfOpen => {
                let successes = self.success_count.fetch_add(1, Ordering::AcqRel) + 1;
                if successes >= self.config.success_threshold {
                    self.transition_to(CircuitState::Closed);
                    tracing::info!("Redis circuit breaker closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        match CircuitState::from(self.state.load(Ordering::Acquire)) {
            CircuitState::Closed => {
                let failures = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
                if failures >= self.config.failure_threshold {
                    self.transition_to(CircuitState::Open);
                    tracing::warn!(failures = failures, "Redis circuit breaker opened");
                }
            }
            CircuitState::HalfOpen => {
                self.transition_to(CircuitState::Open);
                tracing::warn!("Redis circuit breaker reopened after failed trial request");
            }
            CircuitState::Open => {
                self.last_state_change
                    .store(current_time_ms(), Ordering::Release);
            }
        }
    }

    fn maybe_half_open(&self) {
        if CircuitState::from(self.state.load(Ordering::Acquire)) != CircuitState::Open {
            return;
        }

        let elapsed = current_time_ms() - self.last_state_change.load(Ordering::Acquire);
        if elapsed < self.config.reset_timeout_ms as i64 {
            return;
        }

        if self
            .state
            .compare_exchange(
                CircuitState::Open as u8,
                CircuitState::HalfOpen as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            self.success_count.store(0, Ordering::Release);
            self.last_state_change
                .store(current_time_ms(), Ordering::Release);
            tracing::info!("Redis circuit breaker half-open");
        }
    }

    fn transition_to(&self, new_state: CircuitState) {
        self.state.store(new_state as u8, Ordering::Release);
        self.last_state_change
            .store(current_time_ms(), Ordering::Release);
        self.success_count.store(0, Ordering::Release);
        if new_state == CircuitState::Closed {
            self.failure_count.store(0, Ordering::Release);
        }
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        CircuitBreakerStats {
            state: self.state(),
            failure_count: self.failure_count.load(Ordering::Acquire),
            success_count: self.success_count.load(Ordering::Acquire),
            last_state_change_ms: self.last_state_change.load(Ordering::Acquire),
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub last_state_change_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn config(failure_threshold: u32, reset_timeout_ms: u64) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold,
            success_threshold: 2,
            reset_timeout_ms,
        }
    }

    #[test]
    fn test_starts_closed() {
        let cb = CircuitBreaker::new();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_opens_after_threshold() {
        let cb = CircuitBreaker::with_config(config(3, 60_000));

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
    }

    #[test]
    fn test_success_resets_failure_streak() {
        let cb = CircuitBreaker::with_config(config(3, 60_000));

        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        cb.record_failure();

        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_then_closed() {
        let cb = CircuitBreaker::with_config(config(1, 10));

        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_success();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_failed_trial_reopens() {
        let cb = CircuitBreaker::with_config(config(1, 10));

        cb.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        cb.record_failure();
        let raw = CircuitState::from(cb.state.load(Ordering::Acquire));
        assert_eq!(raw, CircuitState::Open);
    }

    #[test]
    fn test_config_from_redis_settings() {
        let redis = RedisConfig {
            circuit_breaker_reset_timeout_seconds: 7,
            ..RedisConfig::default()
        };
        let cfg = CircuitBreakerConfig::from(&redis);
        assert_eq!(cfg.reset_timeout_ms, 7000);
        assert_eq!(cfg.failure_threshold, redis.circuit_breaker_failure_threshold);
    }
}
