//! Bounded exponential backoff schedule
//!
//! Callers drive their own loop and ask the policy how long to wait before
//! each retry, so the schedule is testable without any I/O.

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts = max_retries + 1
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
    /// Upper bound for a single wait, if any
    pub max_delay: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            multiplier: 2,
            max_delay: None,
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    /// Policy for idempotent Gmail calls: 3 retries, 1s doubling up to 30s
    pub fn gmail_default() -> Self {
        Self::new(3, Duration::from_secs(1)).with_max_delay(Duration::from_secs(30))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Wait before retry number `retry` (1-based), or None when the budget is spent
    pub fn delay_before_retry(&self, retry: u32) -> Option<Duration> {
        if retry == 0 || retry > self.max_retries {
            return None;
        }

        let factor = self.multiplier.saturating_pow(retry - 1);
        let delay = self
            .initial_delay
            .checked_mul(factor)
            .unwrap_or(Duration::MAX);

        Some(match self.max_delay {
            Some(cap) => delay.min(cap),
            None => delay,
        })
    }

    /// Every wait in order, one per retry
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (1..=self.max_retries).filter_map(move |retry| self.delay_before_retry(retry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_schedule_doubles() {
        let policy = RetryPolicy::new(3, Duration::from_secs(10));
        let delays: Vec<_> = policy.schedule().collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(10),
                Duration::from_secs(20),
                Duration::from_secs(40)
            ]
        );
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn test_budget_exhaustion() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100));
        assert_eq!(policy.delay_before_retry(0), None);
        assert_eq!(policy.delay_before_retry(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_before_retry(3), None);
    }

    #[test]
    fn test_zero_retries_has_empty_schedule() {
        let policy = RetryPolicy::new(0, Duration::from_secs(10));
        assert_eq!(policy.schedule().count(), 0);
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn test_gmail_default_is_capped() {
        let policy = RetryPolicy {
            max_retries: 8,
            ..RetryPolicy::gmail_default()
        };
        let delays: Vec<_> = policy.schedule().collect();
        assert_eq!(delays[0], Duration::from_secs(1));
        assert_eq!(delays[4], Duration::from_secs(16));
        assert_eq!(delays[5], Duration::from_secs(30));
        assert_eq!(delays[7], Duration::from_secs(30));
    }

    #[test]
    fn test_large_retry_counts_saturate() {
        let policy = RetryPolicy::new(200, Duration::from_secs(1));
        assert!(policy.delay_before_retry(200).is_some());
    }
}
