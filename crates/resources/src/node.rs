//! Node change detection.
//!
//! Node objects churn constantly: the kubelet rewrites condition heartbeat
//! timestamps every few seconds. `NodeComparison::RelevantFields` compares
//! only what load-balancer programming reads; `NodeComparison::Full` keeps
//! plain structural equality over the whole object.

use k8s_openapi::api::core::v1::Node;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// How node update events are compared before enqueueing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeComparison {
    /// Labels, schedulability, taints, addresses and condition statuses
    #[default]
    RelevantFields,
    /// Full structural equality, timestamps included
    Full,
}

impl NodeComparison {
    /// Returns true when `new` differs from `old` in a way that needs a sync.
    pub fn changed(self, old: &Node, new: &Node) -> bool {
        match self {
            Self::Full => old != new,
            Self::RelevantFields => !relevant_fields_equal(old, new),
        }
    }
}

impl FromStr for NodeComparison {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relevant-fields" => Ok(Self::RelevantFields),
            "full" => Ok(Self::Full),
            other => Err(format!(
                "unknown node comparison '{other}' (expected relevant-fields or full)"
            )),
        }
    }
}

/// Field-by-field comparison of the parts of a node that affect programming.
///
/// Compared: `metadata.labels`, `spec.unschedulable`, `spec.taints`,
/// `status.addresses` and the `status` of every condition keyed by type.
/// Condition timestamps, reasons and messages are ignored.
pub fn relevant_fields_equal(old: &Node, new: &Node) -> bool {
    old.metadata.labels == new.metadata.labels
        && unschedulable(old) == unschedulable(new)
        && old.spec.as_ref().and_then(|s| s.taints.as_ref())
            == new.spec.as_ref().and_then(|s| s.taints.as_ref())
        && old.status.as_ref().and_then(|s| s.addresses.as_ref())
            == new.status.as_ref().and_then(|s| s.addresses.as_ref())
        && condition_statuses(old) == condition_statuses(new)
}

pub fn unschedulable(node: &Node) -> bool {
    node.spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false)
}

/// True when the node reports a `Ready` condition with status `True`.
pub fn is_ready(node: &Node) -> bool {
    condition_statuses(node)
        .get("Ready")
        .is_some_and(|status| *status == "True")
}

fn condition_statuses(node: &Node) -> BTreeMap<&str, &str> {
    node.status
        .iter()
        .flat_map(|s| s.conditions.iter().flatten())
        .map(|c| (c.type_.as_str(), c.status.as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{NodeAddress, NodeCondition, NodeSpec, NodeStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn node(ready: &str, heartbeat: u64) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some("worker-1".to_string()),
                ..Default::default()
            },
            spec: Some(NodeSpec::default()),
            status: Some(NodeStatus {
                addresses: Some(vec![NodeAddress {
                    address: "10.0.0.1".to_string(),
                    type_: "InternalIP".to_string(),
                }]),
                conditions: Some(vec![NodeCondition {
                    type_: "Ready".to_string(),
                    status: ready.to_string(),
                    message: Some(format!("kubelet posted status #{heartbeat}")),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_heartbeat_churn_is_not_a_relevant_change() {
        let old = node("True", 1_000);
        let new = node("True", 1_010);
        assert!(!NodeComparison::RelevantFields.changed(&old, &new));
        assert!(NodeComparison::Full.changed(&old, &new));
    }

    #[test]
    fn test_ready_transition_is_a_relevant_change() {
        let old = node("True", 1_000);
        let new = node("False", 1_000);
        assert!(NodeComparison::RelevantFields.changed(&old, &new));
        assert!(!is_ready(&new));
        assert!(is_ready(&old));
    }

    #[test]
    fn test_cordon_is_a_relevant_change() {
        let old = node("True", 1_000);
        let mut new = old.clone();
        new.spec = Some(NodeSpec {
            unschedulable: Some(true),
            ..Default::default()
        });
        assert!(unschedulable(&new));
        assert!(NodeComparison::RelevantFields.changed(&old, &new));
    }

    #[test]
    fn test_identical_nodes_are_unchanged_under_both_modes() {
        let old = node("True", 1_000);
        assert!(!NodeComparison::RelevantFields.changed(&old, &old.clone()));
        assert!(!NodeComparison::Full.changed(&old, &old.clone()));
    }

    #[test]
    fn test_parse_comparison() {
        assert_eq!("full".parse::<NodeComparison>().unwrap(), NodeComparison::Full);
        assert_eq!(
            "relevant-fields".parse::<NodeComparison>().unwrap(),
            NodeComparison::RelevantFields
        );
        assert!("deep".parse::<NodeComparison>().is_err());
    }
}
