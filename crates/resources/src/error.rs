//! Resource model errors

use crate::kind::ResourceKind;
use thiserror::Error;

/// Errors raised while decoding payloads or touching a resource cache.
#[derive(Debug, Error)]
pub enum ResourceError {
    /// Payload declares a different kind than the one being watched
    #[error("expected {expected} payload, got {found}")]
    WrongKind {
        expected: ResourceKind,
        found: String,
    },

    /// Payload could not be deserialized into the expected type
    #[error("failed to decode {kind} payload: {source}")]
    Decode {
        kind: ResourceKind,
        #[source]
        source: serde_json::Error,
    },

    /// A required metadata field is missing
    #[error("{kind} object is missing {field}")]
    MissingField {
        kind: ResourceKind,
        field: &'static str,
    },

    /// Key addressed to a cache holding another kind
    #[error("key {key} cannot be looked up in the {cache} cache")]
    KindMismatch { key: String, cache: ResourceKind },

    /// A writer panicked while holding the cache lock
    #[error("{0} cache lock poisoned")]
    Poisoned(ResourceKind),
}
