//! Test utilities for unit testing handlers, watchers and the dispatcher
//!
//! Builders for the watched Kubernetes objects plus a programmer double
//! that records every desired state it is handed.

use crate::dispatcher::Caches;
use crate::programmer::ExternalStateProgrammer;
use crate::state::DesiredState;
use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Node, NodeAddress, NodeCondition,
    NodeSpec, NodeStatus, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use resources::{ResourceKey, ResourceKind, ResourceRecord};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use workqueue::{ExponentialBackoff, WorkQueue};

/// Helper to create a test Service with one TCP port per entry of `ports`
pub fn create_test_service(
    namespace: &str,
    name: &str,
    resource_version: &str,
    service_type: &str,
    ports: &[i32],
) -> Service {
    let node_ports = service_type != "ClusterIP";
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some(resource_version.to_string()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some(service_type.to_string()),
            ports: Some(
                ports
                    .iter()
                    .map(|port| ServicePort {
                        name: Some(format!("port-{port}")),
                        protocol: Some("TCP".to_string()),
                        port: *port,
                        node_port: node_ports.then_some(30000 + port),
                        target_port: Some(IntOrString::Int(8080)),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
        status: None,
    }
}

/// Helper to create test Endpoints with every ip ready on `port`
pub fn create_test_endpoints(
    namespace: &str,
    name: &str,
    resource_version: &str,
    ips: &[&str],
    port: i32,
) -> Endpoints {
    Endpoints {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            resource_version: Some(resource_version.to_string()),
            ..Default::default()
        },
        subsets: Some(vec![EndpointSubset {
            addresses: Some(
                ips.iter()
                    .map(|ip| EndpointAddress {
                        ip: ip.to_string(),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ports: Some(vec![EndpointPort {
                name: Some("http".to_string()),
                port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }]),
    }
}

/// Helper to create a test Node with an InternalIP and a Ready condition
pub fn create_test_node(name: &str, resource_version: &str, ready: bool, internal_ip: &str) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            resource_version: Some(resource_version.to_string()),
            ..Default::default()
        },
        spec: Some(NodeSpec::default()),
        status: Some(NodeStatus {
            addresses: Some(vec![NodeAddress {
                address: internal_ip.to_string(),
                type_: "InternalIP".to_string(),
            }]),
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

/// Raw watch payload for `object`, as the cluster API would send it
pub fn raw<T: Serialize>(object: &T) -> Value {
    serde_json::to_value(object).unwrap()
}

pub fn record<T: Serialize>(kind: ResourceKind, object: &T) -> ResourceRecord {
    ResourceRecord::from_raw(kind, raw(object)).unwrap()
}

/// Queue with a 1s base retry delay, 5 backoff steps and a 300s cap
pub fn test_queue() -> Arc<WorkQueue<ResourceKey>> {
    Arc::new(WorkQueue::new(
        "test",
        ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(300)).with_max_steps(5),
    ))
}

pub fn test_caches() -> Caches {
    Caches::new()
}

/// Polls `condition` until it holds, failing the test after 10 seconds
pub async fn eventually<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not met within 10s");
}

/// Programmer double recording every call
#[derive(Debug, Default)]
pub struct RecordingProgrammer {
    calls: Mutex<Vec<DesiredState>>,
    failures: AtomicUsize,
    delay: Mutex<Option<Duration>>,
}

impl RecordingProgrammer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls fail
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Make the next call take `delay` before returning
    pub fn delay_next(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<DesiredState> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<DesiredState> {
        self.calls.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl ExternalStateProgrammer for RecordingProgrammer {
    async fn program(&self, desired: &DesiredState) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(desired.clone());
        let delay = self.delay.lock().unwrap().take();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("load balancer unreachable");
        }
        Ok(())
    }
}
