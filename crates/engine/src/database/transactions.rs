//! Retry policy for closure transactions
//!
//! A closure transaction that aborts in validation is re-run from scratch
//! with fresh reads. Only conflicts are worth retrying: a requested abort
//! or a storage fault ends the loop, and so does timestamp exhaustion,
//! since the same keys would hit the same ceiling again.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tictoc_concurrency::{AbortReason, ConflictType};

/// Retry policy, persisted as the `[retry]` table of `tictoc.toml`
///
/// Attempt `n` (counting from 0) sleeps `base_delay_ms * 2^n` before the
/// next try, capped at `max_delay_ms`.
///
/// ```ignore
/// let policy = RetryConfig::new().with_max_retries(10).with_base_delay_ms(0);
/// store.transaction_with_retry(&policy, |txn| { ... })?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Re-runs allowed after the first attempt
    pub max_retries: usize,
    /// Sleep before the first re-run, in milliseconds
    pub base_delay_ms: u64,
    /// Ceiling on any single sleep, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 10,
            max_delay_ms: 100,
        }
    }
}

impl RetryConfig {
    /// Default policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy that gives up after the first abort
    pub fn no_retry() -> Self {
        Self::new().with_max_retries(0)
    }

    /// Set the number of re-runs
    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the first backoff sleep
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Set the backoff ceiling
    pub fn with_max_delay_ms(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Whether a transaction that aborted with `reason` on attempt
    /// `attempt` (0-based) should be run again
    pub(crate) fn should_retry(&self, attempt: usize, reason: &AbortReason) -> bool {
        attempt < self.max_retries && is_retryable(reason)
    }

    /// Sleep after attempt `attempt` (0-based)
    pub(crate) fn backoff(&self, attempt: usize) -> Duration {
        let factor = u32::try_from(attempt)
            .ok()
            .and_then(|n| 2u64.checked_pow(n))
            .unwrap_or(u64::MAX);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }
}

fn is_retryable(reason: &AbortReason) -> bool {
    match reason {
        AbortReason::Conflict(ConflictType::TimestampExhausted { .. }) => false,
        AbortReason::Conflict(_) => true,
        AbortReason::Requested | AbortReason::StorageFault => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tictoc_core::Key;

    fn conflict() -> AbortReason {
        AbortReason::Conflict(ConflictType::LockBusy { key: Key::from("k") })
    }

    #[test]
    fn test_defaults() {
        let policy = RetryConfig::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.base_delay_ms, 10);
        assert_eq!(policy.max_delay_ms, 100);
        assert_eq!(RetryConfig::no_retry().max_retries, 0);
        assert_eq!(RetryConfig::no_retry().base_delay_ms, 10);
    }

    #[test]
    fn test_backoff_doubles_up_to_ceiling() {
        let policy = RetryConfig::new().with_base_delay_ms(3).with_max_delay_ms(20);
        let sleeps: Vec<u128> = (0..5).map(|n| policy.backoff(n).as_millis()).collect();
        assert_eq!(sleeps, vec![3, 6, 12, 20, 20]);
        assert_eq!(policy.backoff(usize::MAX).as_millis(), 20);
    }

    #[test]
    fn test_zero_base_never_sleeps() {
        let policy = RetryConfig::new().with_base_delay_ms(0);
        assert_eq!(policy.backoff(0), Duration::ZERO);
        assert_eq!(policy.backoff(40), Duration::ZERO);
    }

    #[test]
    fn test_retries_conflicts_until_budget_spent() {
        let policy = RetryConfig::new().with_max_retries(2);
        assert!(policy.should_retry(0, &conflict()));
        assert!(policy.should_retry(1, &conflict()));
        assert!(!policy.should_retry(2, &conflict()));
        assert!(!RetryConfig::no_retry().should_retry(0, &conflict()));
    }

    #[test]
    fn test_non_conflicts_are_final() {
        let policy = RetryConfig::new().with_max_retries(100);
        let exhausted = AbortReason::Conflict(ConflictType::TimestampExhausted {
            key: Key::from("k"),
        });
        assert!(!policy.should_retry(0, &exhausted));
        assert!(!policy.should_retry(0, &AbortReason::Requested));
        assert!(!policy.should_retry(0, &AbortReason::StorageFault));
    }
}
