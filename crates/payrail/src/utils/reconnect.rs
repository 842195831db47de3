//! Reconnection logic with exponential backoff for the payment stream
//!
//! Delay before reconnect attempt `n` is `initial_delay × 2^(n-1)` with no
//! upper bound; once `max_attempts` reconnects have been spent the session
//! is over.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Configuration for reconnection behavior
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Consecutive reconnect attempts allowed before giving up
    pub max_attempts: u32,

    /// Delay before the first reconnect attempt in milliseconds
    pub initial_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
        }
    }
}

impl ReconnectConfig {
    /// Creates a configuration with no retries (fail fast)
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }
}

/// Tracks consecutive reconnect attempts for one session
#[derive(Debug)]
pub struct ReconnectStrategy {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectStrategy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Resets the attempt counter (call after successful connection)
    pub fn reset(&mut self) {
        if self.attempts > 0 {
            debug!(attempts = self.attempts, "Reconnection strategy reset");
        }
        self.attempts = 0;
    }

    /// Reconnect attempts started since the last successful connection
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Checks if another reconnect attempt is allowed
    pub fn can_retry(&self) -> bool {
        self.attempts < self.config.max_attempts
    }

    /// Number the next reconnect attempt will carry
    pub fn next_attempt(&self) -> u32 {
        self.attempts + 1
    }

    /// Backoff before reconnect attempt `attempt` (1-indexed)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let multiplier = 1u64
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        Duration::from_millis(self.config.initial_delay_ms.saturating_mul(multiplier))
    }

    /// Gets the next backoff delay without recording an attempt
    pub fn peek_next_delay(&self) -> Duration {
        self.delay_for(self.next_attempt())
    }

    /// Records that a reconnect attempt is starting and returns its number
    pub fn record_attempt(&mut self) -> u32 {
        self.attempts += 1;
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_config_defaults() {
        let config = ReconnectConfig::default();
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.initial_delay_ms, 1000);
    }

    #[test]
    fn test_strategy_can_retry() {
        let config = ReconnectConfig {
            max_attempts: 3,
            ..Default::default()
        };
        let mut strategy = ReconnectStrategy::new(config);

        assert!(strategy.can_retry());
        strategy.record_attempt();
        strategy.record_attempt();
        assert!(strategy.can_retry());
        assert_eq!(strategy.record_attempt(), 3);
        assert!(!strategy.can_retry());
    }

    #[test]
    fn test_strategy_reset() {
        let mut strategy = ReconnectStrategy::new(ReconnectConfig::default());

        for _ in 0..4 {
            strategy.record_attempt();
        }
        assert_eq!(strategy.peek_next_delay(), Duration::from_millis(16_000));

        strategy.reset();

        assert_eq!(strategy.attempts(), 0);
        assert_eq!(strategy.peek_next_delay(), Duration::from_millis(1000));
    }

    #[test]
    fn test_exponential_backoff_uncapped() {
        let strategy = ReconnectStrategy::new(ReconnectConfig {
            max_attempts: 20,
            initial_delay_ms: 100,
        });

        assert_eq!(strategy.delay_for(1), Duration::from_millis(100));
        assert_eq!(strategy.delay_for(2), Duration::from_millis(200));
        assert_eq!(strategy.delay_for(3), Duration::from_millis(400));
        assert_eq!(strategy.delay_for(11), Duration::from_millis(102_400));
        assert_eq!(strategy.delay_for(200), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_no_retry() {
        let strategy = ReconnectStrategy::new(ReconnectConfig::no_retry());
        assert!(!strategy.can_retry());
    }
}
