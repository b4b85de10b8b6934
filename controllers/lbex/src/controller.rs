//! Main controller implementation.
//!
//! `Controller` wires one watch controller per kind (Service, Endpoints,
//! Node) into a single shared work queue drained by the sync dispatcher,
//! and owns the lifecycle of all of them.

use crate::config::ControllerConfig;
use crate::dispatcher::{log_worker_exit, Caches, SyncDispatcher};
use crate::error::ControllerError;
use crate::handler::{
    EndpointsHandler, HandlerContext, NodeHandler, ResourceEventHandler, ServiceHandler,
};
use crate::programmer::{ExternalStateProgrammer, LoggingProgrammer};
use crate::watcher::{WatchConfig, WatchController};
use cluster_client::{KubeListWatch, ListWatchTrait};
use k8s_openapi::api::core::v1::{Endpoints, Node, Service};
use kube::Client;
use resources::{ResourceCache, ResourceKey};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use workqueue::WorkQueue;

/// List/watch access for the three watched kinds.
pub struct ListWatchSources {
    pub services: Arc<dyn ListWatchTrait>,
    pub endpoints: Arc<dyn ListWatchTrait>,
    pub nodes: Arc<dyn ListWatchTrait>,
}

impl std::fmt::Debug for ListWatchSources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListWatchSources").finish_non_exhaustive()
    }
}

impl ListWatchSources {
    /// Sources backed by the API server. Nodes are cluster-scoped and ignore
    /// `namespace`.
    pub fn from_client(client: Client, namespace: Option<&str>) -> Self {
        Self {
            services: Arc::new(KubeListWatch::new::<Service>(client.clone(), namespace)),
            endpoints: Arc::new(KubeListWatch::new::<Endpoints>(client.clone(), namespace)),
            nodes: Arc::new(KubeListWatch::new::<Node>(client, None)),
        }
    }
}

/// Main controller for external load-balancer programming.
#[derive(Debug)]
pub struct Controller {
    config: ControllerConfig,
    queue: Arc<WorkQueue<ResourceKey>>,
    watchers: Vec<WatchController>,
    dispatcher: Arc<SyncDispatcher>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Controller {
    /// Creates a controller talking to the cluster from the ambient
    /// kubeconfig or in-cluster service account.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing load balancer controller");

        let client = Client::try_default().await?;
        let sources = ListWatchSources::from_client(client, config.namespace.as_deref());

        Ok(Self::with_sources(config, sources, Arc::new(LoggingProgrammer)))
    }

    /// Creates a controller over explicit sources and programmer.
    pub fn with_sources(
        config: ControllerConfig,
        sources: ListWatchSources,
        programmer: Arc<dyn ExternalStateProgrammer>,
    ) -> Self {
        let queue = Arc::new(WorkQueue::new("lbex", config.retry_backoff()));
        let caches = Caches::new();
        let cancel = CancellationToken::new();
        let watch_config = WatchConfig {
            resync_interval: config.resync_interval(),
            reconnect: config.reconnect_backoff(),
        };

        let context =
            |cache: &Arc<ResourceCache>| HandlerContext::new(Arc::clone(cache), queue.clone());
        let handlers: [(Arc<dyn ListWatchTrait>, Arc<dyn ResourceEventHandler>); 3] = [
            (
                sources.services,
                Arc::new(ServiceHandler::new(context(&caches.services))),
            ),
            (
                sources.endpoints,
                Arc::new(EndpointsHandler::new(context(&caches.endpoints))),
            ),
            (
                sources.nodes,
                Arc::new(NodeHandler::new(
                    context(&caches.nodes),
                    config.node_comparison,
                )),
            ),
        ];
        let watchers = handlers
            .into_iter()
            .map(|(source, handler)| {
                WatchController::new(source, handler, queue.clone(), watch_config.clone(), &cancel)
            })
            .collect();

        let dispatcher = Arc::new(SyncDispatcher::new(
            queue.clone(),
            caches,
            programmer,
            config.key_resolution,
        ));

        Self {
            config,
            queue,
            watchers,
            dispatcher,
            workers: Vec::new(),
            cancel,
        }
    }

    /// Starts every watcher and the sync workers.
    pub fn start(&mut self) {
        for watcher in &self.watchers {
            watcher.start();
        }
        self.workers = self.dispatcher.spawn_workers(self.config.workers);
        info!(workers = self.config.workers, "Load balancer controller started");
    }

    /// Stops watchers and workers. Rounds in flight finish; queued keys are
    /// abandoned.
    pub async fn shutdown(&mut self) {
        info!("Shutting down load balancer controller");
        self.cancel.cancel();
        self.queue.shutdown();
        for worker in self.workers.drain(..) {
            log_worker_exit(worker.await);
        }
        for watcher in &self.watchers {
            debug!(kind = %watcher.kind(), cached = watcher.cache().len(), "stopping watcher");
            watcher.stop().await;
        }
        info!("Load balancer controller stopped");
    }

    /// Runs the controller until SIGINT or SIGTERM.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        self.start();
        let signal = shutdown_signal().await;
        self.shutdown().await;
        signal
    }
}

async fn shutdown_signal() -> Result<(), ControllerError> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => info!("SIGTERM received"),
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;
    Ok(())
}
