//! Retry policy implementation

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Default number of attempts per task
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay before the first retry
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Default upper bound of the random jitter added to every delay
pub const DEFAULT_JITTER: Duration = Duration::from_millis(250);

/// Configuration for per-task retries
///
/// Exponential backoff with additive jitter, so workers that fail together
/// (e.g. on a shared rate limit) do not retry in lockstep.
///
/// # Example
///
/// ```
/// use fanout::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::default()
///     .with_max_retries(5)
///     .with_backoff_base(Duration::from_secs(1))
///     .with_jitter(Duration::ZERO);
///
/// // Retry after attempt 1 waits 1s, after attempt 2 waits 2s, then 4s, ...
/// assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
/// assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first one), at least 1
    pub max_retries: u32,

    /// Delay after the first failed attempt, doubled for every further failure
    ///
    /// Serialized as whole milliseconds; sub-millisecond precision is dropped.
    #[serde(with = "crate::serde_duration")]
    pub backoff_base: Duration,

    /// Upper bound (exclusive) of the uniform random delay added to every backoff
    ///
    /// Serialized as whole milliseconds, like `backoff_base`.
    #[serde(with = "crate::serde_duration")]
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl RetryPolicy {
    /// Create a policy that makes a single attempt
    pub fn no_retry() -> Self {
        Self {
            max_retries: 1,
            backoff_base: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Set the maximum number of attempts (clamped to at least 1)
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Set the base backoff delay
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// Set the base backoff delay in (fractional) seconds; negative values become zero
    pub fn with_backoff_base_secs(self, secs: f64) -> Self {
        self.with_backoff_base(secs_to_duration(secs))
    }

    /// Set the jitter bound
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Set the jitter bound in (fractional) seconds; negative values become zero
    pub fn with_jitter_secs(self, secs: f64) -> Self {
        self.with_jitter(secs_to_duration(secs))
    }

    /// Deterministic part of the delay after failed attempt `attempt` (1-based):
    /// `backoff_base * 2^(attempt - 1)`
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.backoff_base.as_secs_f64() * 2f64.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Full delay after failed attempt `attempt` (1-based), jitter included
    ///
    /// Always within `[base, base + jitter)`; exactly `base` when jitter is zero.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for_attempt(attempt);
        if self.jitter.is_zero() {
            return base;
        }

        let jitter_secs = rand::thread_rng().gen_range(0.0..self.jitter.as_secs_f64());
        // Float rounding must not reach the exclusive upper bound
        let offset = Duration::from_secs_f64(jitter_secs)
            .min(self.jitter.saturating_sub(Duration::from_nanos(1)));
        base.saturating_add(offset)
    }

    /// Check if there are remaining attempts
    pub fn has_attempts_remaining(&self, current_attempt: u32) -> bool {
        current_attempt < self.max_retries
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.backoff_base, Duration::from_millis(500));
        assert_eq!(policy.jitter, Duration::from_millis(250));
    }

    #[test]
    fn test_no_retry() {
        let policy = RetryPolicy::no_retry();
        assert_eq!(policy.max_retries, 1);
        assert!(!policy.has_attempts_remaining(1));
    }

    #[test]
    fn test_max_retries_clamped() {
        let policy = RetryPolicy::default().with_max_retries(0);
        assert_eq!(policy.max_retries, 1);
    }

    #[test]
    fn test_base_delay_doubles() {
        let policy = RetryPolicy::default()
            .with_backoff_base(Duration::from_millis(500))
            .with_jitter(Duration::ZERO);

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(4000));
    }

    #[test]
    fn test_delay_within_jitter_bounds() {
        let policy = RetryPolicy::default()
            .with_backoff_base(Duration::from_millis(100))
            .with_jitter(Duration::from_millis(50));

        for attempt in 1..=5 {
            let base = Duration::from_millis(100) * 2u32.pow(attempt - 1);
            for _ in 0..200 {
                let delay = policy.delay_for_attempt(attempt);
                assert!(delay >= base, "delay {delay:?} below {base:?}");
                assert!(
                    delay < base + Duration::from_millis(50),
                    "delay {delay:?} not below {:?}",
                    base + Duration::from_millis(50)
                );
            }
        }
    }

    #[test]
    fn test_huge_attempt_saturates() {
        let policy = RetryPolicy::default().with_jitter(Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::MAX);
    }

    #[test]
    fn test_secs_setters() {
        let policy = RetryPolicy::default()
            .with_backoff_base_secs(0.5)
            .with_jitter_secs(-1.0);

        assert_eq!(policy.backoff_base, Duration::from_millis(500));
        assert_eq!(policy.jitter, Duration::ZERO);
    }

    #[test]
    fn test_has_attempts_remaining() {
        let policy = RetryPolicy::default().with_max_retries(3);

        assert!(policy.has_attempts_remaining(1));
        assert!(policy.has_attempts_remaining(2));
        assert!(!policy.has_attempts_remaining(3));
    }

    #[test]
    fn test_serialization() {
        let policy = RetryPolicy::default().with_max_retries(10);

        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["backoff_base"], 500);
        assert_eq!(json["jitter"], 250);

        let parsed: RetryPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(policy, parsed);
    }

    #[test]
    fn test_serialization_truncates_to_millis() {
        let policy = RetryPolicy::default()
            .with_backoff_base_secs(0.0015)
            .with_jitter_secs(0.0005);

        let json = serde_json::to_value(&policy).unwrap();
        assert_eq!(json["backoff_base"], 1);
        assert_eq!(json["jitter"], 0);

        let parsed: RetryPolicy = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.backoff_base, Duration::from_millis(1));
        assert_eq!(parsed.jitter, Duration::ZERO);
    }
}
