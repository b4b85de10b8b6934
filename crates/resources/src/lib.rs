//! Watched resource model
//!
//! Local representation of the cluster resources mirrored by the load-balancer
//! controller:
//! - `ResourceKind` / `ResourceKey`: kind-scoped identifiers
//! - `ResourceRecord`: latest decoded snapshot of one object
//! - `ResourceCache`: per-kind mirror, single writer and many readers
//! - `NodeComparison`: decides whether a node update is worth a sync round

pub mod cache;
pub mod error;
pub mod kind;
pub mod node;
pub mod record;

pub use cache::ResourceCache;
pub use error::ResourceError;
pub use kind::{ResourceKey, ResourceKind};
pub use node::NodeComparison;
pub use record::{ResourceObject, ResourceRecord};
