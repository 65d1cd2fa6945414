//! Fixed-delay retry policy for per-artifact transfer attempts.
//!
//! The policy is an explicit value object applied at exactly two points: each
//! individual transfer+verify attempt (here), and the engine's single
//! aggregated second pass over the failed subset (in the engine itself). Any
//! fetch error counts as retryable — verification failures are handled the
//! same as dropped connections.

use std::time::Duration;

/// Default attempts per artifact, including the first.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default fixed delay between attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the fixed delay.
    Retry {
        /// How long to wait first.
        delay: Duration,
        /// The attempt number this will be (1-indexed).
        attempt: u32,
    },
    /// Attempts exhausted.
    DoNotRetry {
        /// Why no further attempt is made.
        reason: String,
    },
}

/// Bounded-attempt, fixed-delay retry configuration.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Default delay with a custom attempt bound.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Maximum attempts, including the initial one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// The fixed inter-attempt delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Decides whether the attempt that just failed (1-indexed) gets another.
    #[must_use]
    pub fn should_retry(&self, attempt: u32) -> RetryDecision {
        if attempt >= self.max_attempts {
            RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            }
        } else {
            RetryDecision::Retry {
                delay: self.delay,
                attempt: attempt + 1,
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_values() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay(), Duration::from_secs(10));
    }

    #[test]
    fn attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::with_max_attempts(0).max_attempts(), 1);
    }

    #[test]
    fn retries_until_bound_then_stops() {
        let policy = RetryPolicy::new(3, Duration::from_millis(5));

        match policy.should_retry(1) {
            RetryDecision::Retry { delay, attempt } => {
                assert_eq!(delay, Duration::from_millis(5));
                assert_eq!(attempt, 2);
            }
            RetryDecision::DoNotRetry { .. } => panic!("attempt 1 should retry"),
        }
        assert!(matches!(
            policy.should_retry(2),
            RetryDecision::Retry { attempt: 3, .. }
        ));

        match policy.should_retry(3) {
            RetryDecision::DoNotRetry { reason } => {
                assert!(reason.contains("exhausted"), "in: {reason}");
            }
            RetryDecision::Retry { .. } => panic!("attempt 3 is the bound"),
        }
    }

    #[test]
    fn delay_is_fixed_across_attempts() {
        let policy = RetryPolicy::new(5, Duration::from_millis(50));
        for attempt in 1..5 {
            match policy.should_retry(attempt) {
                RetryDecision::Retry { delay, .. } => {
                    assert_eq!(delay, Duration::from_millis(50));
                }
                RetryDecision::DoNotRetry { .. } => panic!("attempt {attempt} should retry"),
            }
        }
    }
}
