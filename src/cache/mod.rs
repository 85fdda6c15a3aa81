//! Versioned snapshot store.
//!
//! # Data Flow
//! ```text
//! scheduler
//!     → SnapshotSink::should_update (version gate, read lock)
//!     → SnapshotSink::update (validate, then replace the node's entry)
//!
//! discovery server
//!     → SnapshotStore::fetch (point-in-time read)
//!     → SnapshotStore::watch (resolves when the node's version moves)
//!     → StreamCallbacks (observation only)
//! ```
//!
//! # Design Decisions
//! - One reader/writer lock over the node table; writes are rare (bounded by resync cadence)
//! - Per-node writer mutex: different nodes never wait on each other, the same node is serialized
//! - Entries are immutable `Arc`s; an update replaces, never mutates

pub mod callbacks;
pub mod discovery;
pub mod store;

use thiserror::Error;

use crate::node::ResourceVersion;
use crate::resources::{ConsistencyError, ResourceBundle, ResourceKind};

pub use callbacks::{LoggingCallbacks, NoopCallbacks, StreamCallbacks};
pub use discovery::{DiscoveryRequest, DiscoveryResponse, SnapshotWatch};
pub use store::{SnapshotEntry, SnapshotStore};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("snapshot version is empty")]
    EmptyVersion,

    #[error("bundle is tagged {actual:?} but was published as {expected:?}")]
    VersionMismatch { expected: String, actual: String },

    #[error("{kind} resource has an empty name")]
    UnnamedResource { kind: ResourceKind },

    #[error("inconsistent bundle: {0}")]
    Inconsistent(#[from] ConsistencyError),

    #[error("no snapshot for node {0:?}")]
    NotFound(String),

    #[error("node {node:?} is already at version {version:?}")]
    UpToDate { node: String, version: String },

    #[error("unknown type URL {0:?}")]
    UnknownTypeUrl(String),
}

/// Write side of the store, as seen by the scheduler.
pub trait SnapshotSink: Send + Sync {
    /// True iff `node` has no entry or its entry carries another version.
    fn should_update(&self, node: &str, version: &ResourceVersion) -> bool;

    /// Validate `bundle` and atomically make it `node`'s current entry.
    fn update(&self, node: &str, version: ResourceVersion, bundle: ResourceBundle) -> Result<(), StoreError>;
}
