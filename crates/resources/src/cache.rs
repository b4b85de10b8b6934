//! Per-kind resource cache.

use crate::error::ResourceError;
use crate::kind::{ResourceKey, ResourceKind};
use crate::record::ResourceRecord;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::trace;

/// Authoritative in-memory mirror of one resource kind.
///
/// Only the owning watch controller writes; the sync dispatcher and the
/// resync timer read. Records are stored behind `Arc` so readers get a
/// stable snapshot while the writer replaces entries wholesale.
#[derive(Debug)]
pub struct ResourceCache {
    kind: ResourceKind,
    items: RwLock<HashMap<ResourceKey, Arc<ResourceRecord>>>,
}

impl ResourceCache {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            items: RwLock::new(HashMap::new()),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Looks up a record by its kind-scoped key.
    pub fn get(&self, key: &ResourceKey) -> Result<Option<Arc<ResourceRecord>>, ResourceError> {
        self.check_kind(key)?;
        let items = self.items.read().map_err(|_| ResourceError::Poisoned(self.kind))?;
        Ok(items.get(key).cloned())
    }

    /// Looks up a record by its cluster-local name (`namespace/name` or `name`).
    pub fn get_by_name(&self, name: &str) -> Result<Option<Arc<ResourceRecord>>, ResourceError> {
        self.get(&ResourceKey::new(self.kind, name))
    }

    /// Inserts or replaces a record, returning the previous one.
    pub fn upsert(&self, record: ResourceRecord) -> Result<Option<Arc<ResourceRecord>>, ResourceError> {
        self.check_kind(&record.key)?;
        let mut items = self.items.write().map_err(|_| ResourceError::Poisoned(self.kind))?;
        trace!(key = %record.key, version = %record.version, "cache upsert");
        Ok(items.insert(record.key.clone(), Arc::new(record)))
    }

    /// Removes a record, returning it if it was present.
    pub fn remove(&self, key: &ResourceKey) -> Result<Option<Arc<ResourceRecord>>, ResourceError> {
        self.check_kind(key)?;
        let mut items = self.items.write().map_err(|_| ResourceError::Poisoned(self.kind))?;
        trace!(key = %key, "cache remove");
        Ok(items.remove(key))
    }

    pub fn keys(&self) -> Result<Vec<ResourceKey>, ResourceError> {
        let items = self.items.read().map_err(|_| ResourceError::Poisoned(self.kind))?;
        Ok(items.keys().cloned().collect())
    }

    /// Snapshot of every record currently cached.
    pub fn list(&self) -> Result<Vec<Arc<ResourceRecord>>, ResourceError> {
        let items = self.items.read().map_err(|_| ResourceError::Poisoned(self.kind))?;
        Ok(items.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every record. Used when the owning controller stops.
    pub fn clear(&self) {
        match self.items.write() {
            Ok(mut items) => items.clear(),
            Err(poisoned) => poisoned.into_inner().clear(),
        }
    }

    fn check_kind(&self, key: &ResourceKey) -> Result<(), ResourceError> {
        if key.kind != self.kind {
            return Err(ResourceError::KindMismatch {
                key: key.to_string(),
                cache: self.kind,
            });
        }
        Ok(())
    }
}
