//! Registry watch subsystem.
//!
//! # Data Flow
//! ```text
//! registry manifest / API
//!     → file.rs (list + watch per record kind, periodic resync)
//!     → types.rs (typed RegistryObject, resolved once here)
//!     → store.rs (copy-on-write mirror + resource-version cursors)
//!     → WatchSource (has_synced / current_version / snapshot)
//!     → reconciler
//! ```
//!
//! # Design Decisions
//! - Sync completion is a watch channel, never a busy poll
//! - Errors before the first sync are startup failures; afterwards the
//!   source retries on its own and the reconciler only reads

pub mod file;
pub mod store;
pub mod types;

use std::path::PathBuf;

use thiserror::Error;
use tokio::sync::watch;

use crate::lifecycle::ShutdownSignal;
use crate::node::ResourceVersion;

pub use file::FileWatchSource;
pub use store::RegistryStore;
pub use types::{
    EndpointAddress, EndpointPort, EndpointRecord, EndpointSubset, RecordKind, RegistryObject,
    RegistrySnapshot, ServiceRecord,
};

/// Errors raised by a watch source.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Reading the registry source failed.
    #[error("failed to read registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The registry source is not valid.
    #[error("failed to parse registry {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The change watcher could not be installed.
    #[error("registry watch error: {0}")]
    Watch(#[from] notify::Error),
}

/// The registry as the reconciler sees it.
///
/// Implementations mirror the registry on their own background task;
/// every method here is a cheap read of that mirror.
pub trait WatchSource: Send + Sync {
    /// Begin background synchronization. Stops when `shutdown` fires.
    fn start(&self, shutdown: ShutdownSignal) -> Result<(), RegistryError>;

    /// True once the initial list has been applied.
    fn has_synced(&self) -> bool;

    /// Receiver that flips to `true` on sync completion.
    fn subscribe_synced(&self) -> watch::Receiver<bool>;

    /// The resource-version cursor the next bundle is tagged with.
    fn current_version(&self) -> ResourceVersion;

    /// Point-in-time copy of the mirrored records.
    fn snapshot(&self) -> RegistrySnapshot;

    /// Records together with the version they were current at, read at once.
    fn versioned_snapshot(&self) -> (ResourceVersion, RegistrySnapshot);
}
