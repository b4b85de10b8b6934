//! Per-kind watch event handlers.
//!
//! Each handler owns explicit references to the cache it mirrors into and
//! the queue it feeds. The watch controller decodes payloads and decides
//! between add and update; handlers decide what is cached and what is
//! enqueued.

use crate::error::ControllerError;
use resources::{NodeComparison, ResourceCache, ResourceKey, ResourceKind, ResourceRecord};
use std::sync::Arc;
use tracing::{debug, trace};
use workqueue::WorkQueue;

/// Callbacks invoked by a watch controller for decoded events.
pub trait ResourceEventHandler: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> ResourceKind;

    /// Cache this handler writes to.
    fn cache(&self) -> &Arc<ResourceCache>;

    fn on_add(&self, record: ResourceRecord) -> Result<(), ControllerError>;

    fn on_update(&self, old: &ResourceRecord, new: ResourceRecord) -> Result<(), ControllerError>;

    fn on_delete(&self, record: &ResourceRecord) -> Result<(), ControllerError>;
}

/// Cache and queue shared by a handler.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    pub cache: Arc<ResourceCache>,
    pub queue: Arc<WorkQueue<ResourceKey>>,
}

impl HandlerContext {
    pub fn new(cache: Arc<ResourceCache>, queue: Arc<WorkQueue<ResourceKey>>) -> Self {
        Self { cache, queue }
    }

    fn store(&self, record: ResourceRecord) -> Result<ResourceKey, ControllerError> {
        let key = record.key.clone();
        self.cache.upsert(record)?;
        Ok(key)
    }

    fn store_and_enqueue(&self, record: ResourceRecord) -> Result<(), ControllerError> {
        let key = self.store(record)?;
        self.queue.enqueue(key);
        Ok(())
    }

    /// Consumers treat a key missing from the cache as a deletion.
    fn remove_and_enqueue(&self, key: &ResourceKey) -> Result<(), ControllerError> {
        self.cache.remove(key)?;
        self.queue.enqueue(key.clone());
        Ok(())
    }
}

#[derive(Debug)]
pub struct ServiceHandler {
    ctx: HandlerContext,
}

impl ServiceHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

impl ResourceEventHandler for ServiceHandler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Service
    }

    fn cache(&self) -> &Arc<ResourceCache> {
        &self.ctx.cache
    }

    fn on_add(&self, record: ResourceRecord) -> Result<(), ControllerError> {
        debug!("Service created: {}", record.key.name);
        self.ctx.store_and_enqueue(record)
    }

    fn on_update(&self, _old: &ResourceRecord, new: ResourceRecord) -> Result<(), ControllerError> {
        debug!("Service updated: {} (version {})", new.key.name, new.version);
        self.ctx.store_and_enqueue(new)
    }

    fn on_delete(&self, record: &ResourceRecord) -> Result<(), ControllerError> {
        debug!("Service deleted: {}", record.key.name);
        self.ctx.remove_and_enqueue(&record.key)
    }
}

#[derive(Debug)]
pub struct EndpointsHandler {
    ctx: HandlerContext,
}

impl EndpointsHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

impl ResourceEventHandler for EndpointsHandler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Endpoints
    }

    fn cache(&self) -> &Arc<ResourceCache> {
        &self.ctx.cache
    }

    fn on_add(&self, record: ResourceRecord) -> Result<(), ControllerError> {
        debug!("Endpoints created: {}", record.key.name);
        self.ctx.store_and_enqueue(record)
    }

    fn on_update(&self, _old: &ResourceRecord, new: ResourceRecord) -> Result<(), ControllerError> {
        debug!("Endpoints updated: {} (version {})", new.key.name, new.version);
        self.ctx.store_and_enqueue(new)
    }

    fn on_delete(&self, record: &ResourceRecord) -> Result<(), ControllerError> {
        debug!("Endpoints deleted: {}", record.key.name);
        self.ctx.remove_and_enqueue(&record.key)
    }
}

/// Node handler: updates are enqueued only when `comparison` sees a change.
#[derive(Debug)]
pub struct NodeHandler {
    ctx: HandlerContext,
    comparison: NodeComparison,
}

impl NodeHandler {
    pub fn new(ctx: HandlerContext, comparison: NodeComparison) -> Self {
        Self { ctx, comparison }
    }
}

impl ResourceEventHandler for NodeHandler {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Node
    }

    fn cache(&self) -> &Arc<ResourceCache> {
        &self.ctx.cache
    }

    fn on_add(&self, record: ResourceRecord) -> Result<(), ControllerError> {
        trace!("AddFunc: enqueuing node {}", record.key.name);
        self.ctx.store_and_enqueue(record)
    }

    fn on_update(&self, old: &ResourceRecord, new: ResourceRecord) -> Result<(), ControllerError> {
        let changed = match (old.as_node(), new.as_node()) {
            (Some(old_node), Some(new_node)) => self.comparison.changed(old_node, new_node),
            _ => true,
        };
        if changed {
            trace!("UpdateFunc: enqueuing changed node {}", new.key.name);
            self.ctx.store_and_enqueue(new)
        } else {
            trace!("UpdateFunc: node {} unchanged, not enqueued", new.key.name);
            self.ctx.store(new).map(|_| ())
        }
    }

    fn on_delete(&self, record: &ResourceRecord) -> Result<(), ControllerError> {
        trace!("DeleteFunc: enqueuing node {}", record.key.name);
        self.ctx.remove_and_enqueue(&record.key)
    }
}
