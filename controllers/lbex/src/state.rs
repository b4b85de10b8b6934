//! Desired external load-balancer state.
//!
//! Always computed from a full snapshot of the caches, never from the event
//! that triggered the sync. Maps are ordered and backend lists sorted, so two
//! computations over unchanged caches compare equal and serialize identically.

use crate::dispatcher::Caches;
use k8s_openapi::api::core::v1::{Endpoints, Node, Service};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use resources::node::{is_ready, unschedulable};
use resources::{ResourceError, ResourceKey, ResourceKind};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::trace;

/// Service types that get a virtual service on the load balancer.
const BALANCED_SERVICE_TYPES: [&str; 2] = ["LoadBalancer", "NodePort"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DesiredState {
    /// Virtual services keyed by `namespace/name`
    pub services: BTreeMap<String, VirtualService>,
    /// NodePort targets keyed by node name
    pub nodes: BTreeMap<String, NodeTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualService {
    pub namespace: String,
    pub name: String,
    pub service_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_balancer_ip: Option<String>,
    pub listeners: Vec<Listener>,
    pub backends: Vec<Backend>,
}

/// Field order drives the derived ordering: listeners sort by port first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Listener {
    pub port: i32,
    pub protocol: String,
    pub name: Option<String>,
    pub node_port: Option<i32>,
    pub target_port: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    pub ip: String,
    pub port: i32,
    pub port_name: Option<String>,
    pub protocol: String,
    pub node_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeTarget {
    pub name: String,
    pub address: String,
}

impl DesiredState {
    /// Builds the desired state from the current contents of all caches.
    pub fn compute(caches: &Caches) -> Result<Self, ResourceError> {
        let mut state = Self::default();

        for record in caches.services.list()? {
            let Some(service) = record.as_service() else {
                continue;
            };
            let Some(mut virtual_service) = VirtualService::from_service(service) else {
                continue;
            };
            let endpoints_key = ResourceKey::new(ResourceKind::Endpoints, record.key.name.clone());
            if let Some(endpoints) = caches.endpoints.get(&endpoints_key)? {
                if let Some(endpoints) = endpoints.as_endpoints() {
                    virtual_service.backends = backends(endpoints);
                }
            }
            state.services.insert(record.key.name.clone(), virtual_service);
        }

        for record in caches.nodes.list()? {
            let Some(node) = record.as_node() else {
                continue;
            };
            if let Some(target) = NodeTarget::from_node(node) {
                state.nodes.insert(target.name.clone(), target);
            }
        }

        Ok(state)
    }

    /// True when this state was derived (in part) from the object at `key`.
    pub fn references(&self, key: &ResourceKey) -> bool {
        match key.kind {
            // backends come from the endpoints sharing the service's name
            ResourceKind::Service | ResourceKind::Endpoints => self.services.contains_key(&key.name),
            ResourceKind::Node => {
                self.nodes.contains_key(&key.name)
                    || self.services.values().any(|vs| {
                        vs.backends
                            .iter()
                            .any(|b| b.node_name.as_deref() == Some(key.name.as_str()))
                    })
            }
        }
    }

    pub fn backend_count(&self) -> usize {
        self.services.values().map(|vs| vs.backends.len()).sum()
    }
}

impl VirtualService {
    fn from_service(service: &Service) -> Option<Self> {
        let spec = service.spec.as_ref()?;
        let service_type = spec.type_.clone().unwrap_or_else(|| "ClusterIP".to_string());
        if !BALANCED_SERVICE_TYPES.contains(&service_type.as_str()) {
            trace!(
                "skipping service {:?} of type {}",
                service.metadata.name, service_type
            );
            return None;
        }

        let mut listeners: Vec<Listener> = spec
            .ports
            .iter()
            .flatten()
            .map(|p| Listener {
                port: p.port,
                protocol: p.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
                name: p.name.clone(),
                node_port: p.node_port,
                target_port: p.target_port.as_ref().map(|t| match t {
                    IntOrString::Int(port) => port.to_string(),
                    IntOrString::String(name) => name.clone(),
                }),
            })
            .collect();
        listeners.sort();

        Some(Self {
            namespace: service.metadata.namespace.clone().unwrap_or_default(),
            name: service.metadata.name.clone().unwrap_or_default(),
            service_type,
            load_balancer_ip: spec.load_balancer_ip.clone(),
            listeners,
            backends: Vec::new(),
        })
    }
}

/// Ready addresses crossed with the ports of each subset.
fn backends(endpoints: &Endpoints) -> Vec<Backend> {
    let mut backends: Vec<Backend> = endpoints
        .subsets
        .iter()
        .flatten()
        .flat_map(|subset| {
            let ports = subset.ports.as_deref().unwrap_or_default();
            subset
                .addresses
                .iter()
                .flatten()
                .flat_map(move |address| {
                    ports.iter().map(move |port| Backend {
                        ip: address.ip.clone(),
                        port: port.port,
                        port_name: port.name.clone(),
                        protocol: port.protocol.clone().unwrap_or_else(|| "TCP".to_string()),
                        node_name: address.node_name.clone(),
                    })
                })
        })
        .collect();
    backends.sort();
    backends.dedup();
    backends
}

impl NodeTarget {
    /// Ready, schedulable nodes with an InternalIP (or ExternalIP) address.
    fn from_node(node: &Node) -> Option<Self> {
        let name = node.metadata.name.clone()?;
        if !is_ready(node) || unschedulable(node) {
            trace!("node {} is not eligible as a load-balancer target", name);
            return None;
        }
        let addresses = node.status.as_ref()?.addresses.as_ref()?;
        let address = ["InternalIP", "ExternalIP"]
            .iter()
            .find_map(|wanted| addresses.iter().find(|a| a.type_ == *wanted))?
            .address
            .clone();
        Some(Self { name, address })
    }
}
