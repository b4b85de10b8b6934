//! Kubernetes-backed list/watch
//!
//! Wraps `kube::Api<DynamicObject>` so every kind is served as raw JSON.
//! List items come back without `apiVersion`/`kind`; they are filled in from
//! the resource description so downstream decoding sees complete payloads.

use crate::error::ClusterError;
use crate::list_watch_trait::{ListWatchTrait, WatchStream};
use crate::models::{ObjectListing, WatchEvent};
use futures::{StreamExt, TryStreamExt};
use kube::api::{Api, ListParams, WatchParams};
use kube::core::{ApiResource, DynamicObject, TypeMeta};
use kube::{Client, Resource};
use serde_json::Value;
use tracing::debug;

/// Server-side watch timeout; the server closes the stream after this long.
const WATCH_TIMEOUT_SECS: u32 = 290;

/// List/watch access to one resource kind via the Kubernetes API
pub struct KubeListWatch {
    api: Api<DynamicObject>,
    resource: ApiResource,
}

impl std::fmt::Debug for KubeListWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeListWatch")
            .field("kind", &self.resource.kind)
            .finish()
    }
}

impl KubeListWatch {
    /// Create a list/watch for kind `K`
    ///
    /// # Arguments
    /// * `client` - Kubernetes client
    /// * `namespace` - Restrict a namespaced kind to one namespace (`None` = all namespaces)
    pub fn new<K>(client: Client, namespace: Option<&str>) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        let resource = ApiResource::erase::<K>(&());
        let api = match namespace {
            Some(ns) => Api::namespaced_with(client, ns, &resource),
            None => Api::all_with(client, &resource),
        };
        Self { api, resource }
    }
}

fn to_raw(mut object: DynamicObject, resource: &ApiResource) -> Result<Value, ClusterError> {
    if object.types.is_none() {
        object.types = Some(TypeMeta {
            api_version: resource.api_version.clone(),
            kind: resource.kind.clone(),
        });
    }
    Ok(serde_json::to_value(&object)?)
}

#[async_trait::async_trait]
impl ListWatchTrait for KubeListWatch {
    async fn list(&self) -> Result<ObjectListing, ClusterError> {
        debug!(kind = %self.resource.kind, "listing objects");
        let list = self.api.list(&ListParams::default()).await?;
        let items = list
            .items
            .into_iter()
            .map(|object| to_raw(object, &self.resource))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ObjectListing {
            items,
            resource_version: list.metadata.resource_version,
        })
    }

    async fn watch(&self, resource_version: &str) -> Result<WatchStream, ClusterError> {
        debug!(kind = %self.resource.kind, resource_version, "opening watch");
        let params = WatchParams::default().timeout(WATCH_TIMEOUT_SECS);
        let resource = self.resource.clone();
        let stream = self
            .api
            .watch(&params, resource_version)
            .await?
            .map_err(ClusterError::from)
            .and_then(move |event| {
                let converted = match event {
                    kube::core::WatchEvent::Added(o) => to_raw(o, &resource).map(WatchEvent::Added),
                    kube::core::WatchEvent::Modified(o) => {
                        to_raw(o, &resource).map(WatchEvent::Modified)
                    }
                    kube::core::WatchEvent::Deleted(o) => {
                        to_raw(o, &resource).map(WatchEvent::Deleted)
                    }
                    kube::core::WatchEvent::Bookmark(b) => Ok(WatchEvent::Bookmark {
                        resource_version: b.metadata.resource_version,
                    }),
                    kube::core::WatchEvent::Error(status) => {
                        Err(ClusterError::from_status(status.code, status.message))
                    }
                };
                futures::future::ready(converted)
            });
        Ok(stream.boxed())
    }
}
