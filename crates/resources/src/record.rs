//! Decoded snapshots of watched objects.
//!
//! Raw watch payloads are decoded exactly once, at the watch boundary, into
//! the closed `ResourceObject` variant. Nothing downstream probes types at
//! runtime.

use crate::error::ResourceError;
use crate::kind::{ResourceKey, ResourceKind};
use k8s_openapi::api::core::v1::{Endpoints, Node, Service};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;

/// Typed payload of a watched object.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceObject {
    Service(Service),
    Endpoints(Endpoints),
    Node(Node),
}

impl ResourceObject {
    /// Decodes a raw payload as `kind`.
    ///
    /// A payload that names a different `kind` is rejected before
    /// deserialization so a misrouted object never lands in the wrong cache.
    pub fn decode(kind: ResourceKind, raw: Value) -> Result<Self, ResourceError> {
        if let Some(found) = raw.get("kind").and_then(Value::as_str) {
            if found != kind.api_kind() {
                return Err(ResourceError::WrongKind {
                    expected: kind,
                    found: found.to_string(),
                });
            }
        }
        let decode_err = |source| ResourceError::Decode { kind, source };
        let object = match kind {
            ResourceKind::Service => Self::Service(serde_json::from_value(raw).map_err(decode_err)?),
            ResourceKind::Endpoints => {
                Self::Endpoints(serde_json::from_value(raw).map_err(decode_err)?)
            }
            ResourceKind::Node => Self::Node(serde_json::from_value(raw).map_err(decode_err)?),
        };
        Ok(object)
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Service(_) => ResourceKind::Service,
            Self::Endpoints(_) => ResourceKind::Endpoints,
            Self::Node(_) => ResourceKind::Node,
        }
    }

    pub fn metadata(&self) -> &ObjectMeta {
        match self {
            Self::Service(s) => &s.metadata,
            Self::Endpoints(e) => &e.metadata,
            Self::Node(n) => &n.metadata,
        }
    }
}

/// Latest known snapshot of one object, replaced wholesale on every event.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    pub key: ResourceKey,
    /// Opaque version token issued by the cluster API (`metadata.resourceVersion`)
    pub version: String,
    pub object: ResourceObject,
}

impl ResourceRecord {
    pub fn new(object: ResourceObject) -> Result<Self, ResourceError> {
        let key = ResourceKey::from_meta(object.kind(), object.metadata())?;
        let version = object
            .metadata()
            .resource_version
            .clone()
            .unwrap_or_default();
        Ok(Self {
            key,
            version,
            object,
        })
    }

    /// Decodes a raw watch or list payload of `kind` into a record.
    pub fn from_raw(kind: ResourceKind, raw: Value) -> Result<Self, ResourceError> {
        Self::new(ResourceObject::decode(kind, raw)?)
    }

    pub fn kind(&self) -> ResourceKind {
        self.key.kind
    }

    /// Version token as a number, when the server issued a numeric one.
    pub fn version_number(&self) -> Option<u64> {
        self.version.parse().ok()
    }

    pub fn as_service(&self) -> Option<&Service> {
        match &self.object {
            ResourceObject::Service(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_endpoints(&self) -> Option<&Endpoints> {
        match &self.object {
            ResourceObject::Endpoints(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match &self.object {
            ResourceObject::Node(n) => Some(n),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn service_payload(ns: &str, name: &str, version: &str) -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": { "namespace": ns, "name": name, "resourceVersion": version },
            "spec": { "type": "LoadBalancer", "ports": [{ "port": 80 }] }
        })
    }

    #[test]
    fn test_decode_service_payload() {
        let record = ResourceRecord::from_raw(ResourceKind::Service, service_payload("ns", "a", "100")).unwrap();
        assert_eq!(record.key, ResourceKey::new(ResourceKind::Service, "ns/a"));
        assert_eq!(record.version, "100");
        assert_eq!(record.version_number(), Some(100));
        assert!(record.as_service().is_some());
        assert!(record.as_node().is_none());
    }

    #[test]
    fn test_decode_rejects_other_kind() {
        let err = ResourceRecord::from_raw(ResourceKind::Node, service_payload("ns", "a", "1")).unwrap_err();
        match err {
            ResourceError::WrongKind { expected, found } => {
                assert_eq!(expected, ResourceKind::Node);
                assert_eq!(found, "Service");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        let raw = json!({ "kind": "Node", "metadata": { "name": 42 } });
        let err = ResourceRecord::from_raw(ResourceKind::Node, raw).unwrap_err();
        assert!(matches!(err, ResourceError::Decode { kind: ResourceKind::Node, .. }));
    }

    #[test]
    fn test_payload_without_kind_is_decoded_as_requested_kind() {
        let raw = json!({ "metadata": { "name": "worker-1", "resourceVersion": "7" } });
        let record = ResourceRecord::from_raw(ResourceKind::Node, raw).unwrap();
        assert_eq!(record.key.name, "worker-1");
        assert!(record.as_node().is_some());
    }
}
