//! Exponential backoff with jitter

use std::time::Duration;

use rand::Rng;

use crate::config::FanoutConfig;

#[derive(Debug, Clone)]
pub struct BackoffConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    /// Fraction of the delay added or subtracted at random (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl From<&FanoutConfig> for BackoffConfig {
    fn from(config: &FanoutConfig) -> Self {
        Self {
            initial_delay_ms: config.backoff_initial_delay_ms,
            max_delay_ms: config.backoff_max_delay_ms,
            ..Self::default()
        }
    }
}

pub struct ExponentialBackoff {
    config: BackoffConfig,
    current_delay_ms: u64,
    attempt: u32,
}

impl ExponentialBackoff {
    pub fn new() -> Self {
        Self::with_config(BackoffConfig::default())
    }

    pub fn with_config(config: BackoffConfig) -> Self {
        let initial = config.initial_delay_ms;
        Self {
            config,
            current_delay_ms: initial,
            attempt: 0,
        }
    }

    /// First call returns the initial delay, later calls grow it up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt += 1;

        let base = if self.attempt == 1 {
            self.config.initial_delay_ms as f64
        } else {
            self.current_delay_ms as f64 * self.config.multiplier
        };
        let capped = base.min(self.config.max_delay_ms as f64);
        self.current_delay_ms = capped as u64;

        let jittered = if self.config.jitter_factor > 0.0 && capped > 0.0 {
            let range = capped * self.config.jitter_factor;
            capped + rand::rng().random_range(-range..range)
        } else {
            capped
        };

        Duration::from_millis(jittered.max(1.0) as u64)
    }

    pub fn reset(&mut self) {
        self.current_delay_ms = self.config.initial_delay_ms;
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(initial_delay_ms: u64, max_delay_ms: u64) -> BackoffConfig {
        BackoffConfig {
            initial_delay_ms,
            max_delay_ms,
            multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn test_delays_double() {
        let mut backoff = ExponentialBackoff::with_config(no_jitter(100, 10_000));

        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_is_capped() {
        let mut backoff = ExponentialBackoff::with_config(no_jitter(1000, 5000));

        for _ in 0..10 {
            backoff.next_delay();
        }

        assert_eq!(backoff.next_delay(), Duration::from_millis(5000));
    }

    #[test]
    fn test_reset() {
        let mut backoff = ExponentialBackoff::with_config(no_jitter(100, 10_000));
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let config = BackoffConfig {
            initial_delay_ms: 1000,
            max_delay_ms: 1000,
            multiplier: 2.0,
            jitter_factor: 0.1,
        };
        let mut backoff = ExponentialBackoff::with_config(config);

        for _ in 0..20 {
            let delay = backoff.next_delay().as_millis();
            assert!((900..=1100).contains(&delay));
        }
    }
}
