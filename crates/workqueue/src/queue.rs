//! Deduplicating work queue.
//!
//! Bookkeeping follows three sets:
//! - `queue`: keys waiting for a worker, in arrival order
//! - `processing`: keys a worker currently holds
//! - `dirty`: keys that need (another) processing round; every queued key is
//!   dirty, and a key re-requested while processing stays dirty until
//!   `mark_done` puts it back on the queue
//!
//! A key is therefore never handed to two workers at once, and a change that
//! arrives mid-round is never lost.

use crate::backoff::ExponentialBackoff;
use crate::rate_limiter::{BackoffRecord, RateLimiter};
use std::collections::{HashSet, VecDeque};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

#[derive(Debug)]
struct QueueState<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    shutting_down: bool,
}

/// Rate-limited work queue shared by producers (watchers, resync timers)
/// and consumers (sync workers).
#[derive(Debug)]
pub struct WorkQueue<K> {
    name: String,
    state: Mutex<QueueState<K>>,
    notify: Notify,
    /// Cancels pending `enqueue_after` timers on shutdown
    closed: CancellationToken,
    rate_limiter: RateLimiter<K>,
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    /// Creates a queue whose failed keys are retried following `backoff`.
    pub fn new(name: impl Into<String>, backoff: ExponentialBackoff) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            closed: CancellationToken::new(),
            rate_limiter: RateLimiter::new(backoff),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Requests a processing round for `key`.
    ///
    /// Idempotent: a key that is already queued is not queued twice, and a
    /// key that is being processed is only marked dirty.
    pub fn enqueue(&self, key: K) {
        let mut state = self.lock();
        if state.shutting_down {
            trace!(queue = %self.name, ?key, "queue shutting down, dropping key");
            return;
        }
        if !state.dirty.insert(key.clone()) {
            trace!(queue = %self.name, ?key, "key already pending");
            return;
        }
        if state.processing.contains(&key) {
            trace!(queue = %self.name, ?key, "key in flight, marked dirty");
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.notify.notify_one();
    }

    /// Waits for the next key, or returns `None` once shutdown has begun.
    ///
    /// Keys still queued when `shutdown` is called are never handed out.
    pub async fn dequeue(&self) -> Option<K> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
            }

            notified.await;
        }
    }

    /// Ends the processing round for `key`, requeueing it if it went dirty.
    pub fn mark_done(&self, key: &K) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.shutting_down {
            trace!(queue = %self.name, ?key, "dirty key requeued after processing");
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Schedules `key` to be enqueued again once `delay` has elapsed.
    ///
    /// Pending timers are dropped as soon as the queue shuts down.
    pub fn enqueue_after(self: &Arc<Self>, key: K, delay: Duration) {
        if self.is_shutting_down() {
            return;
        }
        if delay.is_zero() {
            self.enqueue(key);
            return;
        }
        let queue = Arc::clone(self);
        let closed = self.closed.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => queue.enqueue(key),
                _ = closed.cancelled() => {
                    trace!(queue = %queue.name, ?key, "delayed enqueue dropped on shutdown");
                }
            }
        });
    }

    /// Records a failed round for `key` and schedules a retry after the
    /// key's backoff delay. Returns the delay.
    pub fn requeue(self: &Arc<Self>, key: K, error: &dyn Display) -> Duration {
        let delay = self.rate_limiter.when(&key, &error.to_string());
        warn!(
            queue = %self.name,
            ?key,
            retries = self.rate_limiter.num_requeues(&key),
            delay_ms = delay.as_millis() as u64,
            "sync failed, requeueing: {}",
            error
        );
        self.enqueue_after(key, delay);
        delay
    }

    /// Clears the retry state of `key` after a successful round.
    pub fn forget(&self, key: &K) {
        self.rate_limiter.forget(key);
    }

    pub fn num_requeues(&self, key: &K) -> u32 {
        self.rate_limiter.num_requeues(key)
    }

    pub fn backoff_record(&self, key: &K) -> Option<BackoffRecord> {
        self.rate_limiter.record(key)
    }

    /// Stops handing out keys. Rounds already in flight may finish; queued
    /// keys are abandoned.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if state.shutting_down {
            return;
        }
        state.shutting_down = true;
        let abandoned = state.queue.len();
        drop(state);
        debug!(queue = %self.name, abandoned, "work queue shutting down");
        self.closed.cancel();
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of keys waiting for a worker.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_processing(&self, key: &K) -> bool {
        self.lock().processing.contains(key)
    }

    pub fn is_dirty(&self, key: &K) -> bool {
        self.lock().dirty.contains(key)
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
