//! Load Balancer Controller
//!
//! Keeps an external load balancer in sync with the cluster:
//! - Service: virtual services and their listeners
//! - Endpoints: backends of each virtual service
//! - Node: NodePort targets
//!
//! Each kind is mirrored by a list-then-watch controller into a local cache.
//! Changes are funnelled through one deduplicating work queue to sync
//! workers that recompute and program the full desired state.

mod config;
mod controller;
mod dispatcher;
mod error;
mod handler;
mod programmer;
mod state;
mod watcher;
#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // kube's rustls client needs a process-wide crypto provider
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        info!("rustls crypto provider already installed");
    }

    info!("Starting Load Balancer Controller");

    let config = ControllerConfig::load()?;

    info!("Configuration:");
    info!("  Resync interval: {}s", config.resync_interval_secs);
    info!("  Sync workers: {}", config.workers);
    info!(
        "  Retry backoff: {}ms base, {} steps, {}s cap",
        config.retry_base_delay_ms, config.retry_max_steps, config.retry_max_delay_secs
    );
    info!("  Key resolution: {:?}", config.key_resolution);
    info!("  Node comparison: {:?}", config.node_comparison);
    info!(
        "  Namespace: {}",
        config.namespace.as_deref().unwrap_or("all namespaces")
    );

    // Initialize and run controller
    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
