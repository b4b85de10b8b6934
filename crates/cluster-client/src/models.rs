//! List and watch payload models.
//!
//! Objects travel as raw JSON: decoding into typed resources happens once,
//! in the watch controller, so a payload of an unexpected shape can be
//! dropped at that boundary instead of failing the whole stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of a List RPC.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectListing {
    pub items: Vec<Value>,
    /// Collection version the listing was served at
    pub resource_version: Option<String>,
}

/// One event of a Watch RPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "object")]
pub enum WatchEvent {
    Added(Value),
    Modified(Value),
    Deleted(Value),
    /// Progress marker carrying only a newer version token
    Bookmark { resource_version: String },
}

impl WatchEvent {
    /// Version token carried by the event, if any.
    pub fn resource_version(&self) -> Option<&str> {
        match self {
            Self::Added(obj) | Self::Modified(obj) | Self::Deleted(obj) => obj
                .get("metadata")
                .and_then(|m| m.get("resourceVersion"))
                .and_then(Value::as_str),
            Self::Bookmark { resource_version } => Some(resource_version),
        }
    }
}
