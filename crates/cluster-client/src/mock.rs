//! Mock list/watch for unit testing
//!
//! Listings and watch sessions are scripted up front; each `list` or `watch`
//! call consumes the next scripted response. Watch sessions are fed through
//! a `WatchHandle` so a test can push events while the controller runs.

use crate::error::ClusterError;
use crate::list_watch_trait::{ListWatchTrait, WatchStream};
use crate::models::{ObjectListing, WatchEvent};
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::StreamExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

type EventResult = Result<WatchEvent, ClusterError>;

#[derive(Debug)]
enum WatchScript {
    Stream(UnboundedReceiver<EventResult>),
    Fail(ClusterError),
}

#[derive(Debug, Default)]
struct MockState {
    listings: VecDeque<Result<ObjectListing, ClusterError>>,
    last_listing: Option<ObjectListing>,
    watches: VecDeque<WatchScript>,
    list_calls: usize,
    watch_versions: Vec<String>,
}

/// Mock list/watch for testing
///
/// When the scripted listings run out, the last successful listing is served
/// again. When the scripted watches run out, `watch` returns a stream that
/// never yields.
#[derive(Debug, Clone, Default)]
pub struct MockListWatch {
    state: Arc<Mutex<MockState>>,
    calls: Arc<Notify>,
}

/// Feeds events into one scripted watch session
#[derive(Debug)]
pub struct WatchHandle {
    tx: UnboundedSender<EventResult>,
}

impl WatchHandle {
    pub fn send(&self, event: WatchEvent) {
        let _ = self.tx.unbounded_send(Ok(event));
    }

    /// Deliver an error inside the stream
    pub fn fail(&self, err: ClusterError) {
        let _ = self.tx.unbounded_send(Err(err));
    }

    /// Server-side close of the watch
    pub fn close(self) {
        drop(self);
    }
}

impl MockListWatch {
    /// Create a new mock with nothing scripted
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next listing (for test setup)
    pub fn push_listing(&self, items: Vec<Value>, resource_version: &str) {
        self.state.lock().unwrap().listings.push_back(Ok(ObjectListing {
            items,
            resource_version: Some(resource_version.to_string()),
        }));
    }

    /// Script a failing List RPC
    pub fn push_list_error(&self, err: ClusterError) {
        self.state.lock().unwrap().listings.push_back(Err(err));
    }

    /// Script the next watch session and return its feeding handle
    pub fn push_watch(&self) -> WatchHandle {
        let (tx, rx) = mpsc::unbounded();
        self.state
            .lock()
            .unwrap()
            .watches
            .push_back(WatchScript::Stream(rx));
        WatchHandle { tx }
    }

    /// Script a Watch RPC that fails to open
    pub fn push_watch_error(&self, err: ClusterError) {
        self.state
            .lock()
            .unwrap()
            .watches
            .push_back(WatchScript::Fail(err));
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    /// Version tokens passed to every `watch` call so far
    pub fn watch_versions(&self) -> Vec<String> {
        self.state.lock().unwrap().watch_versions.clone()
    }

    /// Wait until `watch` has been called at least `n` times
    pub async fn wait_for_watch_calls(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(30), async {
            loop {
                let notified = self.calls.notified();
                if self.state.lock().unwrap().watch_versions.len() >= n {
                    return;
                }
                notified.await;
            }
        })
        .await
        .expect("timed out waiting for watch calls");
    }
}

#[async_trait::async_trait]
impl ListWatchTrait for MockListWatch {
    async fn list(&self) -> Result<ObjectListing, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        let result = match state.listings.pop_front() {
            Some(Ok(listing)) => {
                state.last_listing = Some(listing.clone());
                Ok(listing)
            }
            Some(Err(err)) => Err(err),
            None => Ok(state.last_listing.clone().unwrap_or_default()),
        };
        drop(state);
        self.calls.notify_waiters();
        result
    }

    async fn watch(&self, resource_version: &str) -> Result<WatchStream, ClusterError> {
        let mut state = self.state.lock().unwrap();
        state.watch_versions.push(resource_version.to_string());
        let script = state.watches.pop_front();
        drop(state);
        self.calls.notify_waiters();
        match script {
            Some(WatchScript::Stream(rx)) => Ok(rx.boxed()),
            Some(WatchScript::Fail(err)) => Err(err),
            None => Ok(futures::stream::pending().boxed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_listing_repeats_when_exhausted() {
        let mock = MockListWatch::new();
        mock.push_listing(vec![json!({ "metadata": { "name": "a" } })], "10");

        assert_eq!(mock.list().await.unwrap().resource_version.as_deref(), Some("10"));
        assert_eq!(mock.list().await.unwrap().items.len(), 1);
        assert_eq!(mock.list_calls(), 2);
    }

    #[tokio::test]
    async fn test_scripted_watch_delivers_events_until_closed() {
        let mock = MockListWatch::new();
        let handle = mock.push_watch();
        let mut stream = mock.watch("10").await.unwrap();

        handle.send(WatchEvent::Bookmark {
            resource_version: "11".to_string(),
        });
        handle.close();

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.resource_version(), Some("11"));
        assert!(stream.next().await.is_none());
        assert_eq!(mock.watch_versions(), vec!["10".to_string()]);
    }

    #[tokio::test]
    async fn test_scripted_watch_error() {
        let mock = MockListWatch::new();
        mock.push_watch_error(ClusterError::from_status(410, "gone"));
        let err = mock.watch("1").await.err().unwrap();
        assert!(err.is_expired());
    }
}
