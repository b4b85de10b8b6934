//! ListWatchTrait for mocking
//!
//! This trait abstracts the List and Watch RPCs of one resource kind.
//! The kube-backed `KubeListWatch` implements it, and tests use `MockListWatch`.

use crate::error::ClusterError;
use crate::models::{ObjectListing, WatchEvent};
use futures::stream::BoxStream;

/// Stream of watch events; ends when the server closes the watch.
pub type WatchStream = BoxStream<'static, Result<WatchEvent, ClusterError>>;

/// List/watch operations for one resource kind
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ListWatchTrait: Send + Sync {
    /// Enumerate every object of the kind (all namespaces, match-all selectors)
    async fn list(&self) -> Result<ObjectListing, ClusterError>;

    /// Open a change stream starting after `resource_version`
    async fn watch(&self, resource_version: &str) -> Result<WatchStream, ClusterError>;
}
