//! Bounded exponential backoff for transport failures.

use crate::error::{HarvestError, Result};
use std::time::Duration;
use tracing::{error, warn};

/// Retry ceiling and backoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated; `0` retries forever
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    fn is_exhausted(&self, failures: u32) -> bool {
        self.max_attempts != 0 && failures >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Consecutive-failure tracker for one traversal.
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    failures: u32,
}

impl Backoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy, failures: 0 }
    }

    /// Register a failed attempt.
    ///
    /// Returns how long to wait before trying again. Non-retryable errors are
    /// handed back unchanged; past the ceiling the error is wrapped in
    /// [`HarvestError::RetriesExhausted`].
    pub fn record_failure(&mut self, err: HarvestError) -> Result<Duration> {
        if !err.is_retryable() {
            return Err(err);
        }

        self.failures += 1;
        if self.policy.is_exhausted(self.failures) {
            error!(attempts = self.failures, error = %err, "Retry limit reached");
            return Err(HarvestError::RetriesExhausted {
                attempts: self.failures,
                last_error: Box::new(err),
            });
        }

        let mut wait = self.policy.delay_for(self.failures);
        if let HarvestError::RateLimited(secs) = &err {
            wait = wait.max(Duration::from_secs(*secs));
        }

        warn!(
            attempt = self.failures,
            wait_ms = wait.as_millis() as u64,
            error = %err,
            "Request failed, backing off"
        );
        Ok(wait)
    }

    /// Clear the failure count after a successful request.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }

    #[test]
    fn test_backoff_exponential_and_capped() {
        let p = policy(0);
        assert_eq!(p.delay_for(1), Duration::from_secs(1));
        assert_eq!(p.delay_for(2), Duration::from_secs(2));
        assert_eq!(p.delay_for(4), Duration::from_secs(8));
        assert_eq!(p.delay_for(5), Duration::from_secs(10));
        assert_eq!(p.delay_for(200), Duration::from_secs(10));
    }

    #[test]
    fn test_ceiling_surfaces_terminal_error() {
        let mut backoff = Backoff::new(policy(2));
        assert!(backoff.record_failure(HarvestError::Parse("x".into())).is_ok());
        match backoff.record_failure(HarvestError::Parse("y".into())) {
            Err(HarvestError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 2),
            other => panic!("expected RetriesExhausted, got {:?}", other),
        }
    }

    #[test]
    fn test_reset_clears_failures() {
        let mut backoff = Backoff::new(policy(2));
        assert!(backoff.record_failure(HarvestError::Parse("x".into())).is_ok());
        backoff.reset();
        assert_eq!(backoff.failures(), 0);
        assert!(backoff.record_failure(HarvestError::Parse("x".into())).is_ok());
    }

    #[test]
    fn test_unbounded_policy_never_gives_up() {
        let mut backoff = Backoff::new(policy(0));
        for _ in 0..50 {
            assert!(backoff.record_failure(HarvestError::RateLimited(0)).is_ok());
        }
    }

    #[test]
    fn test_rate_limit_hint_extends_wait() {
        let mut backoff = Backoff::new(policy(5));
        let wait = backoff.record_failure(HarvestError::RateLimited(30));
        assert_eq!(wait.ok(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_non_retryable_passes_through() {
        let mut backoff = Backoff::new(policy(5));
        let result = backoff.record_failure(HarvestError::Config("bad".into()));
        assert!(matches!(result, Err(HarvestError::Config(_))));
        assert_eq!(backoff.failures(), 0);
    }
}
