//! Resource kinds and kind-scoped keys.

use crate::error::ResourceError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of cluster objects the controller mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Service,
    Endpoints,
    Node,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [Self::Service, Self::Endpoints, Self::Node];

    /// Kind name as the cluster API spells it in `kind`.
    pub fn api_kind(self) -> &'static str {
        match self {
            Self::Service => "Service",
            Self::Endpoints => "Endpoints",
            Self::Node => "Node",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Endpoints => "endpoints",
            Self::Node => "node",
        }
    }

    pub fn is_namespaced(self) -> bool {
        !matches!(self, Self::Node)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one object across every watched kind.
///
/// `name` is the cluster-local key: `namespace/name` for namespaced kinds and
/// plain `name` for cluster-scoped ones. Two objects of different kinds may
/// share `name`; the `kind` tag keeps their keys distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceKey {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Builds the key of an object from its metadata.
    pub fn from_meta(kind: ResourceKind, meta: &ObjectMeta) -> Result<Self, ResourceError> {
        let name = meta.name.as_deref().ok_or(ResourceError::MissingField {
            kind,
            field: "metadata.name",
        })?;
        let local = match meta.namespace.as_deref() {
            Some(ns) if kind.is_namespaced() && !ns.is_empty() => format!("{ns}/{name}"),
            _ => name.to_string(),
        };
        Ok(Self::new(kind, local))
    }

    /// Namespace part of a namespaced key.
    pub fn namespace(&self) -> Option<&str> {
        self.name.split_once('/').map(|(ns, _)| ns)
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.name)
    }
}
