//! Controller work queue
//!
//! Collapses bursts of change notifications for the same key into a single
//! processing round:
//! - `WorkQueue`: queued / processing / dirty bookkeeping with async `dequeue`
//! - `RateLimiter`: per-key failure tracking for delayed requeues
//! - `ExponentialBackoff`: capped exponential delay calculator

pub mod backoff;
pub mod queue;
pub mod rate_limiter;

pub use backoff::ExponentialBackoff;
pub use queue::WorkQueue;
pub use rate_limiter::{BackoffRecord, RateLimiter};
