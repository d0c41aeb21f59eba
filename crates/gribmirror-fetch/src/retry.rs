//! Retry policy for failed fetch attempts.

use std::time::Duration;

use gribmirror_config::RetryConfig;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Resubmit after waiting.
    RetryAfter(Duration),
    /// Stop and dead-letter the intent.
    GiveUp,
}

/// Exponential backoff with an optional attempt ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    multiplier: f64,
}

impl RetryPolicy {
    /// Policy described by `config`. `max_attempts == 0` never gives up.
    #[must_use]
    pub const fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            multiplier: config.multiplier,
        }
    }

    /// Decide what follows failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn decide(&self, attempt: u32) -> RetryDecision {
        if self.max_attempts > 0 && attempt >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.backoff(attempt))
    }

    /// Delay after failed attempt `attempt`:
    /// `initial * multiplier^(attempt - 1)`, capped at the maximum.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let scaled = self.initial_backoff.as_secs_f64() * factor;
        if !scaled.is_finite() || scaled >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(scaled).min(self.max_backoff)
    }

    /// Attempt ceiling, or `None` when unlimited.
    #[must_use]
    pub const fn max_attempts(&self) -> Option<u32> {
        if self.max_attempts == 0 {
            None
        } else {
            Some(self.max_attempts)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::from_config(&RetryConfig {
            max_attempts,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(1),
            multiplier: 2.0,
        })
    }

    #[test]
    fn backoff_grows_and_caps() {
        let policy = policy(10);
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(4), Duration::from_millis(800));
        assert_eq!(policy.backoff(5), Duration::from_secs(1));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn gives_up_at_the_ceiling() {
        let policy = policy(3);
        assert!(matches!(policy.decide(1), RetryDecision::RetryAfter(_)));
        assert!(matches!(policy.decide(2), RetryDecision::RetryAfter(_)));
        assert_eq!(policy.decide(3), RetryDecision::GiveUp);
        assert_eq!(policy.max_attempts(), Some(3));
    }

    #[test]
    fn zero_ceiling_retries_forever() {
        let policy = policy(0);
        assert_eq!(policy.max_attempts(), None);
        assert_eq!(
            policy.decide(1_000_000),
            RetryDecision::RetryAfter(Duration::from_secs(1))
        );
    }
}
