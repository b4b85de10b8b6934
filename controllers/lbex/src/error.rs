//! Controller-specific error types.
//!
//! This module defines error types specific to the load-balancer controller
//! that are not covered by upstream library errors.

use cluster_client::ClusterError;
use kube::Error as KubeError;
use resources::ResourceError;
use thiserror::Error;

/// Errors that can occur in the load-balancer controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// List or watch failure
    #[error("Cluster API error: {0}")]
    Cluster(#[from] ClusterError),

    /// Resource cache lookup or update failed
    #[error("Cache error: {0}")]
    Cache(#[from] ResourceError),

    /// The external state programmer rejected the desired state
    #[error("External state programming failed: {0:#}")]
    Programming(anyhow::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O failure (config file, signal handling)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
