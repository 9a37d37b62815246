//! Retry policy with jittered exponential backoff.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Bounds for retrying retryable runner errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base delay before the first retry.
    #[serde(default = "default_base", with = "humantime_serde")]
    pub base: Duration,
    /// Upper bound on any single delay.
    #[serde(default = "default_cap", with = "humantime_serde")]
    pub cap: Duration,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base() -> Duration {
    Duration::from_secs(1)
}

fn default_cap() -> Duration {
    Duration::from_secs(30)
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base: default_base(),
            cap: default_cap(),
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt is allowed after `attempts` tries.
    #[must_use]
    pub fn allows_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the attempt following attempt number `attempt`
    /// (1-based). Doubles per attempt, capped, with up to 10% jitter; a
    /// provider `retry_after` hint overrides the computed base.
    #[must_use]
    pub fn backoff(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let computed = self.base.saturating_mul(1 << exp);
        let delay = hint.unwrap_or(computed).min(self.cap);

        let jitter_budget = delay.as_millis() as u64 / 10;
        let jitter = if jitter_budget == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_budget)
        };
        delay + Duration::from_millis(jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base, Duration::from_secs(1));
        assert_eq!(policy.cap, Duration::from_secs(30));
    }

    #[test]
    fn allows_retry_under_cap() {
        let policy = RetryPolicy::default();
        assert!(policy.allows_retry(1));
        assert!(policy.allows_retry(2));
        assert!(!policy.allows_retry(3));
        assert!(!policy.allows_retry(4));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        };
        // Jitter adds at most 10%, so check lower and upper bounds.
        let first = policy.backoff(1, None);
        assert!(first >= Duration::from_secs(1));
        assert!(first <= Duration::from_millis(1100));

        let third = policy.backoff(3, None);
        assert!(third >= Duration::from_secs(4));
        assert!(third <= Duration::from_millis(4400));

        // Attempt 10 would be 512s uncapped.
        let late = policy.backoff(10, None);
        assert!(late >= Duration::from_secs(30));
        assert!(late <= Duration::from_secs(33));
    }

    #[test]
    fn hint_overrides_computed_delay() {
        let policy = RetryPolicy::default();
        let delay = policy.backoff(1, Some(Duration::from_secs(7)));
        assert!(delay >= Duration::from_secs(7));
        assert!(delay <= Duration::from_millis(7700));
    }

    #[test]
    fn hint_still_capped() {
        let policy = RetryPolicy::default();
        let delay = policy.backoff(1, Some(Duration::from_secs(300)));
        assert!(delay <= Duration::from_secs(33));
    }
}
