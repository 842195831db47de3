//! Retry policy for request/response calls
//!
//! Pure exponential backoff without jitter: the delay after attempt `k`
//! (1-indexed) is `initial_delay × backoff_factor^(k-1)`.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Immutable retry configuration attached to a request executor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per logical call, including the first (>= 1)
    pub max_attempts: u32,

    /// Delay before the second attempt in milliseconds
    pub initial_delay_ms: u64,

    /// Multiplier applied to the delay after every attempt (> 1)
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, failures surface immediately
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Attempts allowed per call, never less than one
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay to wait after failed attempt `attempt` (1-indexed) before the next one
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_factor.powi(exponent);
        // `as` saturates on overflow
        Duration::from_millis(delay_ms.round() as u64)
    }

    /// Full delay schedule between attempts of one call
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.attempts()).map(|attempt| self.delay_for(attempt)).collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "max_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.backoff_factor > 1.0) {
            return Err(ConfigError::Invalid {
                key: "backoff_factor",
                reason: format!("must be greater than 1, got {}", self.backoff_factor),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.initial_delay_ms, 1000);
        assert_eq!(policy.backoff_factor, 2.0);
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy::default().with_max_attempts(5);

        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert_eq!(
            policy.schedule(),
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(2000),
                Duration::from_millis(4000),
                Duration::from_millis(8000),
            ]
        );
    }

    #[test]
    fn test_fractional_factor() {
        let policy = RetryPolicy::default()
            .with_initial_delay(Duration::from_millis(100))
            .with_backoff_factor(1.5);

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(150));
        assert_eq!(policy.delay_for(3), Duration::from_millis(225));
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(10_000), Duration::from_millis(u64::MAX));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(RetryPolicy::default().with_max_attempts(0).validate().is_err());
        assert!(RetryPolicy::default().with_backoff_factor(1.0).validate().is_err());
        assert!(RetryPolicy::no_retry().validate().is_ok());
        assert!(RetryPolicy::no_retry().schedule().is_empty());
    }
}
