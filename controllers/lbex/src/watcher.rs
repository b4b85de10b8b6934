//! List-then-watch controllers.
//!
//! One `WatchController` runs per resource kind. It mirrors the kind into a
//! `ResourceCache` through its `ResourceEventHandler` and feeds keys into the
//! shared work queue:
//!
//! 1. List every object, rebuild the cache, remember the collection version.
//! 2. Watch from that version, applying Added/Modified/Deleted events.
//! 3. When the stream ends, reconnect with exponential backoff. An expired
//!    version (HTTP 410) forces a fresh list instead of a resume.
//! 4. Independently, re-enqueue every cached key on a fixed interval.

use crate::error::ControllerError;
use crate::handler::ResourceEventHandler;
use cluster_client::{ClusterError, ListWatchTrait, WatchEvent};
use futures::StreamExt;
use resources::{ResourceCache, ResourceKey, ResourceKind, ResourceRecord};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use workqueue::{ExponentialBackoff, WorkQueue};

/// Timing shared by every watch controller.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// Interval between full re-enqueues of the cache (zero disables resync)
    pub resync_interval: Duration,
    /// Delay policy between reconnect attempts
    pub reconnect: ExponentialBackoff,
}

/// How a watch session ended.
#[derive(Debug)]
enum WatchOutcome {
    Cancelled,
    /// The resume version is no longer served; a relist is required
    Expired,
    /// Stream closed or failed; resume from `version`
    Interrupted {
        version: String,
        error: Option<ClusterError>,
    },
}

struct WatchLoop {
    source: Arc<dyn ListWatchTrait>,
    handler: Arc<dyn ResourceEventHandler>,
    queue: Arc<WorkQueue<ResourceKey>>,
    config: WatchConfig,
}

impl std::fmt::Debug for WatchLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchLoop")
            .field("kind", &self.handler.kind())
            .field("config", &self.config)
            .finish()
    }
}

/// Background list-watch synchronization for one resource kind.
#[derive(Debug)]
pub struct WatchController {
    inner: Arc<WatchLoop>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WatchController {
    /// Creates a controller whose lifetime is bounded by `parent`.
    pub fn new(
        source: Arc<dyn ListWatchTrait>,
        handler: Arc<dyn ResourceEventHandler>,
        queue: Arc<WorkQueue<ResourceKey>>,
        config: WatchConfig,
        parent: &CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(WatchLoop {
                source,
                handler,
                queue,
                config,
            }),
            cancel: parent.child_token(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.inner.handler.kind()
    }

    /// Cache mirrored by this controller, for read-only lookups.
    pub fn cache(&self) -> Arc<ResourceCache> {
        Arc::clone(self.inner.handler.cache())
    }

    /// Spawns the list-watch loop and the resync timer.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if !tasks.is_empty() {
            warn!(kind = %self.kind(), "watch controller already started");
            return;
        }
        info!("Starting {} watcher", self.kind());
        tasks.push(tokio::spawn(
            Arc::clone(&self.inner).run(self.cancel.clone()),
        ));
        tasks.push(tokio::spawn(
            Arc::clone(&self.inner).resync(self.cancel.clone()),
        ));
    }

    /// Stops both background tasks, waits for them and tears the cache down.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(kind = %self.kind(), "watch task ended abnormally: {}", e);
            }
        }
        self.inner.handler.cache().clear();
        info!("Stopped {} watcher", self.kind());
    }
}

impl WatchLoop {
    fn kind(&self) -> ResourceKind {
        self.handler.kind()
    }

    async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut backoff = self.config.reconnect.clone();
        let mut resume: Option<String> = None;

        loop {
            let version = match resume.take() {
                Some(version) => version,
                None => {
                    let listed = tokio::select! {
                        _ = cancel.cancelled() => break,
                        listed = self.relist() => listed,
                    };
                    match listed {
                        Ok(version) => version,
                        Err(e) => {
                            warn!(kind = %self.kind(), "list failed: {}", e);
                            if !pause(&mut backoff, &cancel).await {
                                break;
                            }
                            continue;
                        }
                    }
                }
            };

            match self.watch_from(&version, &mut backoff, &cancel).await {
                WatchOutcome::Cancelled => break,
                WatchOutcome::Expired => {
                    info!(kind = %self.kind(), version = %version, "watch version expired, relisting");
                }
                WatchOutcome::Interrupted { version, error } => {
                    match error {
                        Some(e) => warn!(kind = %self.kind(), "watch interrupted: {}", e),
                        None => debug!(kind = %self.kind(), "watch closed by server"),
                    }
                    resume = Some(version);
                }
            }

            if !pause(&mut backoff, &cancel).await {
                break;
            }
        }

        debug!(kind = %self.kind(), "list-watch loop stopped");
    }

    /// Rebuilds the cache from a full listing and returns the version to
    /// watch from.
    async fn relist(&self) -> Result<String, ControllerError> {
        let listing = self.source.list().await?;
        let cache = self.handler.cache();

        let mut seen = HashSet::new();
        let mut highest: Option<u64> = None;
        for raw in listing.items {
            let Some(record) = self.decode(raw) else {
                continue;
            };
            seen.insert(record.key.clone());
            highest = highest.max(record.version_number());
            self.upsert(record)?;
        }

        // objects deleted while we were not watching
        for key in cache.keys()? {
            if seen.contains(&key) {
                continue;
            }
            if let Some(stale) = cache.get(&key)? {
                self.handler.on_delete(&stale)?;
            }
        }

        let version = listing
            .resource_version
            .filter(|v| !v.is_empty())
            .or_else(|| highest.map(|v| v.to_string()))
            .unwrap_or_else(|| "0".to_string());
        info!(kind = %self.kind(), objects = cache.len(), version = %version, "initial list complete");
        Ok(version)
    }

    async fn watch_from(
        &self,
        version: &str,
        backoff: &mut ExponentialBackoff,
        cancel: &CancellationToken,
    ) -> WatchOutcome {
        let opened = tokio::select! {
            _ = cancel.cancelled() => return WatchOutcome::Cancelled,
            opened = self.source.watch(version) => opened,
        };
        let mut stream = match opened {
            Ok(stream) => stream,
            Err(e) if e.is_expired() => return WatchOutcome::Expired,
            Err(e) => {
                return WatchOutcome::Interrupted {
                    version: version.to_string(),
                    error: Some(e),
                };
            }
        };
        backoff.reset();
        debug!(kind = %self.kind(), version = %version, "watch opened");

        let mut last_version = version.to_string();
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return WatchOutcome::Cancelled,
                next = stream.next() => next,
            };
            match next {
                None => {
                    return WatchOutcome::Interrupted {
                        version: last_version,
                        error: None,
                    };
                }
                Some(Err(e)) if e.is_expired() => return WatchOutcome::Expired,
                Some(Err(e)) => {
                    return WatchOutcome::Interrupted {
                        version: last_version,
                        error: Some(e),
                    };
                }
                Some(Ok(event)) => {
                    if let Some(v) = event.resource_version().filter(|v| !v.is_empty()) {
                        last_version = v.to_string();
                    }
                    if let Err(e) = self.apply(event) {
                        error!(kind = %self.kind(), "failed to apply watch event: {}", e);
                    }
                }
            }
        }
    }

    fn apply(&self, event: WatchEvent) -> Result<(), ControllerError> {
        match event {
            WatchEvent::Added(raw) | WatchEvent::Modified(raw) => match self.decode(raw) {
                Some(record) => self.upsert(record),
                None => Ok(()),
            },
            WatchEvent::Deleted(raw) => match self.decode(raw) {
                Some(record) => self.handler.on_delete(&record),
                None => Ok(()),
            },
            WatchEvent::Bookmark { resource_version } => {
                trace!(kind = %self.kind(), version = %resource_version, "bookmark");
                Ok(())
            }
        }
    }

    fn upsert(&self, record: ResourceRecord) -> Result<(), ControllerError> {
        match self.handler.cache().get(&record.key)? {
            Some(old) => self.handler.on_update(&old, record),
            None => self.handler.on_add(record),
        }
    }

    /// Payloads of the wrong kind or shape are dropped here.
    fn decode(&self, raw: Value) -> Option<ResourceRecord> {
        match ResourceRecord::from_raw(self.kind(), raw) {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(kind = %self.kind(), "dropping undecodable payload: {}", e);
                None
            }
        }
    }

    async fn resync(self: Arc<Self>, cancel: CancellationToken) {
        let period = self.config.resync_interval;
        if period.is_zero() {
            debug!(kind = %self.kind(), "resync disabled");
            return;
        }
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.handler.cache().keys() {
                        Ok(keys) => {
                            trace!(kind = %self.kind(), count = keys.len(), "resync");
                            for key in keys {
                                self.queue.enqueue(key);
                            }
                        }
                        Err(e) => warn!(kind = %self.kind(), "resync skipped: {}", e),
                    }
                }
            }
        }
    }
}

/// Sleeps for the next reconnect delay. Returns false if cancelled first.
async fn pause(backoff: &mut ExponentialBackoff, cancel: &CancellationToken) -> bool {
    let delay = backoff.next_backoff();
    trace!(delay_ms = delay.as_millis() as u64, "waiting before reconnect");
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
