//! Per-key retry bookkeeping.

use crate::backoff::ExponentialBackoff;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Retry state of one key, created on its first failure and cleared on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffRecord {
    /// Consecutive failed sync rounds
    pub failures: u32,
    /// Earliest time the key is handed out again
    pub next_eligible: Instant,
    /// Display form of the most recent failure
    pub last_error: String,
}

/// Tracks consecutive failures per key and turns them into delays.
///
/// There is no retry limit: a key that keeps failing keeps coming back at
/// the capped delay until it succeeds and is forgotten.
#[derive(Debug)]
pub struct RateLimiter<K> {
    backoff: ExponentialBackoff,
    records: Mutex<HashMap<K, BackoffRecord>>,
}

impl<K> RateLimiter<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self {
            backoff,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Records a failure for `key` and returns how long to wait before retrying.
    pub fn when(&self, key: &K, error: &str) -> Duration {
        let mut records = self.lock();
        let failures = records.get(key).map(|r| r.failures).unwrap_or(0);
        let delay = self.backoff.delay_for(failures);
        records.insert(
            key.clone(),
            BackoffRecord {
                failures: failures.saturating_add(1),
                next_eligible: Instant::now() + delay,
                last_error: error.to_string(),
            },
        );
        delay
    }

    /// Clears the retry state of `key` after a successful round.
    pub fn forget(&self, key: &K) {
        self.lock().remove(key);
    }

    pub fn num_requeues(&self, key: &K) -> u32 {
        self.lock().get(key).map(|r| r.failures).unwrap_or(0)
    }

    pub fn record(&self, key: &K) -> Option<BackoffRecord> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, BackoffRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
