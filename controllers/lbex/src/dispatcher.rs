//! Sync dispatcher.
//!
//! Workers drain the shared work queue. Each round resolves the key against
//! the live caches, recomputes the complete desired state and hands it to
//! the external state programmer. Failed rounds are requeued with backoff,
//! successful ones clear the key's retry history.
//!
//! Keys reach workers concurrently, but full-state rounds run one at a
//! time: a round computes, programs and records its state while holding the
//! round lock, so an older snapshot can never land after a newer one.

use crate::config::KeyResolution;
use crate::error::ControllerError;
use crate::programmer::ExternalStateProgrammer;
use crate::state::DesiredState;
use resources::{ResourceCache, ResourceError, ResourceKey, ResourceKind, ResourceRecord};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};
use workqueue::WorkQueue;

/// The three resource caches, read by the dispatcher.
#[derive(Debug, Clone)]
pub struct Caches {
    pub services: Arc<ResourceCache>,
    pub endpoints: Arc<ResourceCache>,
    pub nodes: Arc<ResourceCache>,
}

impl Caches {
    pub fn new() -> Self {
        Self {
            services: Arc::new(ResourceCache::new(ResourceKind::Service)),
            endpoints: Arc::new(ResourceCache::new(ResourceKind::Endpoints)),
            nodes: Arc::new(ResourceCache::new(ResourceKind::Node)),
        }
    }

    pub fn for_kind(&self, kind: ResourceKind) -> &Arc<ResourceCache> {
        match kind {
            ResourceKind::Service => &self.services,
            ResourceKind::Endpoints => &self.endpoints,
            ResourceKind::Node => &self.nodes,
        }
    }
}

impl Default for Caches {
    fn default() -> Self {
        Self::new()
    }
}

/// What a queued key resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Found(Arc<ResourceRecord>),
    /// Not cached: the object was deleted (or never existed)
    Absent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Programmed,
    NothingToDo,
    ShuttingDown,
}

pub struct SyncDispatcher {
    queue: Arc<WorkQueue<ResourceKey>>,
    caches: Caches,
    programmer: Arc<dyn ExternalStateProgrammer>,
    resolution: KeyResolution,
    /// Held from computing a state until it is programmed and recorded
    round: tokio::sync::Mutex<()>,
    last_programmed: Mutex<Option<DesiredState>>,
}

impl std::fmt::Debug for SyncDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncDispatcher")
            .field("queue", &self.queue.name())
            .field("resolution", &self.resolution)
            .finish_non_exhaustive()
    }
}

impl SyncDispatcher {
    pub fn new(
        queue: Arc<WorkQueue<ResourceKey>>,
        caches: Caches,
        programmer: Arc<dyn ExternalStateProgrammer>,
        resolution: KeyResolution,
    ) -> Self {
        Self {
            queue,
            caches,
            programmer,
            resolution,
            round: tokio::sync::Mutex::new(()),
            last_programmed: Mutex::new(None),
        }
    }

    /// Looks `key` up in the caches according to the configured resolution.
    pub fn resolve(&self, key: &ResourceKey) -> Result<Resolution, ResourceError> {
        let found = match self.resolution {
            KeyResolution::KindScoped => self.caches.for_kind(key.kind).get(key)?,
            KeyResolution::ServiceFirst => {
                // the kind tag is ignored; first cache holding the name wins
                let mut found = None;
                for kind in ResourceKind::ALL {
                    found = self.caches.for_kind(kind).get_by_name(&key.name)?;
                    if found.is_some() {
                        break;
                    }
                }
                found
            }
        };
        Ok(match found {
            Some(record) => Resolution::Found(record),
            None => Resolution::Absent,
        })
    }

    /// Runs one reconciliation round for `key`.
    pub async fn sync(&self, key: &ResourceKey) -> Result<SyncOutcome, ControllerError> {
        if self.queue.is_shutting_down() {
            debug!(key = %key, "shutting down, skipping sync");
            return Ok(SyncOutcome::ShuttingDown);
        }

        let _round = self.round.lock().await;
        if self.queue.is_shutting_down() {
            debug!(key = %key, "shut down while waiting for the round lock");
            return Ok(SyncOutcome::ShuttingDown);
        }

        match self.resolve(key)? {
            Resolution::Found(record) => {
                debug!(key = %key, resolved = %record.key, version = %record.version, "syncing");
            }
            Resolution::Absent => {
                let referenced = match self.resolution {
                    KeyResolution::ServiceFirst => false,
                    KeyResolution::KindScoped => self
                        .last_programmed()
                        .as_ref()
                        .is_some_and(|state| state.references(key)),
                };
                if !referenced {
                    debug!(key = %key, "not cached and not programmed, nothing to do");
                    return Ok(SyncOutcome::NothingToDo);
                }
                debug!(key = %key, "deleted, reprogramming without it");
            }
        }

        let desired = DesiredState::compute(&self.caches)?;
        self.programmer
            .program(&desired)
            .await
            .map_err(ControllerError::Programming)?;
        *self
            .last_programmed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(desired);
        Ok(SyncOutcome::Programmed)
    }

    /// Processes one key. Returns false once the queue has shut down.
    pub async fn process_next(&self) -> bool {
        let Some(key) = self.queue.dequeue().await else {
            return false;
        };

        match self.sync(&key).await {
            Ok(outcome) => {
                trace!(key = %key, ?outcome, "sync complete");
                self.queue.forget(&key);
            }
            Err(e) => {
                self.queue.requeue(key.clone(), &e);
            }
        }
        self.queue.mark_done(&key);
        true
    }

    /// Spawns `workers` tasks draining the queue until it shuts down.
    pub fn spawn_workers(self: &Arc<Self>, workers: usize) -> Vec<JoinHandle<()>> {
        (0..workers)
            .map(|worker| {
                let dispatcher = Arc::clone(self);
                tokio::spawn(async move {
                    debug!(worker, "sync worker started");
                    while dispatcher.process_next().await {}
                    debug!(worker, "sync worker stopped");
                })
            })
            .collect()
    }

    pub fn last_programmed(&self) -> Option<DesiredState> {
        self.last_programmed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Logs a worker task that ended with a panic.
pub(crate) fn log_worker_exit(result: Result<(), tokio::task::JoinError>) {
    match result {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => info!("sync worker cancelled"),
        Err(e) => error!("sync worker panicked: {}", e),
    }
}
