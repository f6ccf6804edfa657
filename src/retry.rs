//! Retry policy for provider page fetches
//!
//! A single declared policy (max attempts, exponential base, cap, jitter)
//! consumed uniformly by every provider call site instead of bespoke
//! per-call loops. Authorization failures are never retried; that rule
//! lives with the error classification, not here.

use std::time::Duration;

use rand::{Rng, thread_rng};

use crate::config::RetryPolicyConfig;

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts for one page fetch, including the first
    pub max_attempts: u32,
    pub base_seconds: u64,
    pub max_seconds: u64,
    pub jitter_factor: f64,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryPolicyConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_seconds: config.base_seconds,
            max_seconds: config.max_seconds,
            jitter_factor: config.jitter_factor,
        }
    }

    /// Delay before the next attempt, after `prior_failures` failed ones.
    /// A provider Retry-After hint wins when it exceeds the computed
    /// backoff; jitter is added on top either way.
    pub fn backoff_delay(&self, prior_failures: u32, retry_after: Option<u64>) -> Duration {
        let exponent = prior_failures.min(i32::MAX as u32) as i32;
        let mut backoff =
            (self.base_seconds as f64 * 2_f64.powi(exponent)).min(self.max_seconds as f64);

        if let Some(retry_after) = retry_after {
            backoff = backoff.max(retry_after as f64);
        }

        let jitter_span = self.jitter_factor * backoff;
        let jitter = if jitter_span > 0.0 {
            thread_rng().gen_range(0.0..jitter_span)
        } else {
            0.0
        };

        Duration::from_secs_f64(backoff + jitter)
    }

    /// Whether another attempt remains after `attempts_made` completed ones.
    pub fn attempts_remaining(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryPolicyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_seconds: 5,
            max_seconds: 900,
            jitter_factor: 0.1,
        }
    }

    #[test]
    fn test_backoff_grows_exponentially() {
        let policy = test_policy();

        let backoff0 = policy.backoff_delay(0, None).as_secs_f64();
        assert!((5.0..=5.5).contains(&backoff0)); // base * 2^0, jitter adds up to 0.5

        let backoff1 = policy.backoff_delay(1, None).as_secs_f64();
        assert!((10.0..=11.0).contains(&backoff1)); // base * 2^1, jitter up to 1

        let backoff2 = policy.backoff_delay(2, None).as_secs_f64();
        assert!((20.0..=22.0).contains(&backoff2)); // base * 2^2, jitter up to 2
    }

    #[test]
    fn test_backoff_caps_at_max() {
        let policy = test_policy();

        let backoff = policy.backoff_delay(10, None).as_secs_f64();
        assert!(backoff >= 900.0);
        assert!(backoff <= 900.0 + 900.0 * 0.1);
    }

    #[test]
    fn test_retry_after_precedence() {
        let policy = test_policy();

        // Hint larger than computed backoff wins
        let backoff = policy.backoff_delay(0, Some(300)).as_secs_f64();
        assert!((300.0..=330.0).contains(&backoff));

        // Computed backoff wins when the hint is smaller
        let backoff = policy.backoff_delay(3, Some(2)).as_secs_f64();
        assert!((40.0..=44.0).contains(&backoff));
    }

    #[test]
    fn test_zero_jitter_is_deterministic() {
        let policy = RetryPolicy {
            jitter_factor: 0.0,
            ..test_policy()
        };
        assert_eq!(policy.backoff_delay(1, None), Duration::from_secs(10));
    }

    #[test]
    fn test_attempts_remaining() {
        let policy = test_policy();
        assert!(policy.attempts_remaining(0));
        assert!(policy.attempts_remaining(2));
        assert!(!policy.attempts_remaining(3));
    }
}
