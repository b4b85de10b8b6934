//! Cluster list/watch access
//!
//! The controller only needs two RPCs per resource kind: a full listing and
//! a change stream resumed from a version token. `ListWatchTrait` captures
//! that contract so the watch loop can run against the real API server
//! (`KubeListWatch`) or a scripted double in tests (`MockListWatch`).
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{KubeListWatch, ListWatchTrait};
//! use k8s_openapi::api::core::v1::Service;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = kube::Client::try_default().await?;
//! let services = KubeListWatch::new::<Service>(client, None);
//!
//! let listing = services.list().await?;
//! let version = listing.resource_version.unwrap_or_default();
//! let _events = services.watch(&version).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod list_watch_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::KubeListWatch;
pub use error::ClusterError;
pub use models::{ObjectListing, WatchEvent};
pub use list_watch_trait::{ListWatchTrait, WatchStream};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockListWatch, WatchHandle};
