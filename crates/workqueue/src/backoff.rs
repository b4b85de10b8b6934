//! # Exponential Backoff
//!
//! Capped exponential delays for retries.
//!
//! The delay for the n-th consecutive failure (0-based) is
//! `base * 2^n`, with the exponent optionally frozen after `max_steps`
//! doublings and the result capped at `max_delay`. The sequence never ends:
//! callers keep retrying at the capped delay.

use std::time::Duration;

/// Exponential backoff calculator
///
/// Used both statelessly (`delay_for`, driven by a per-key failure count) and
/// statefully (`next_backoff` / `reset`, for a single reconnecting loop).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Delay of the first retry
    base: Duration,
    /// Upper bound for any delay
    max_delay: Duration,
    /// Number of distinct delay steps before the sequence flattens
    max_steps: Option<u32>,
    /// Consecutive failures seen by `next_backoff`
    attempt: u32,
}

impl ExponentialBackoff {
    /// Create a backoff doubling from `base` up to `max_delay`
    #[must_use]
    pub fn new(base: Duration, max_delay: Duration) -> Self {
        Self {
            base,
            max_delay,
            max_steps: None,
            attempt: 0,
        }
    }

    /// Limit the sequence to `steps` distinct delays
    ///
    /// With `steps = 5` and a 1s base the sequence is 1s, 2s, 4s, 8s, 16s, 16s, ...
    #[must_use]
    pub fn with_max_steps(mut self, steps: u32) -> Self {
        self.max_steps = Some(steps.max(1));
        self
    }

    /// Delay for a given number of consecutive failures (0-based, stateless)
    #[must_use]
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = match self.max_steps {
            Some(steps) => failures.min(steps - 1),
            None => failures,
        };
        let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max_delay)
    }

    /// Get the next delay and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let delay = self.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    /// Reset the backoff to the initial state after a success
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::new(Duration::from_millis(500), Duration::from_secs(30));

        assert_eq!(backoff.next_backoff(), Duration::from_millis(500));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(8));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(16));
        // 32s would exceed the cap
        assert_eq!(backoff.next_backoff(), Duration::from_secs(30));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(30));
    }

    #[test]
    fn test_exponential_backoff_max_steps() {
        let backoff = ExponentialBackoff::new(Duration::from_millis(1000), Duration::from_secs(300))
            .with_max_steps(5);

        let delays: Vec<_> = (0..6).map(|n| backoff.delay_for(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
                Duration::from_secs(16),
            ]
        );
    }

    #[test]
    fn test_exponential_backoff_reset() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(60));

        backoff.next_backoff();
        backoff.next_backoff();
        assert_eq!(backoff.next_backoff(), Duration::from_secs(4));

        backoff.reset();

        // Should restart from beginning after success
        assert_eq!(backoff.next_backoff(), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_failure_count_saturates_at_cap() {
        let backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(300));
        assert_eq!(backoff.delay_for(64), Duration::from_secs(300));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_secs(300));
    }
}
