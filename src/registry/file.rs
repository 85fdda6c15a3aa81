//! File-backed watch source.
//!
//! Mirrors a TOML registry manifest:
//!
//! ```toml
//! [[services]]
//! name = "foo"
//! namespace = "default"
//! annotations = { domains = "*" }
//!
//! [[endpoints]]
//! name = "foo"
//! namespace = "default"
//! subsets = [{ addresses = [{ ip = "10.1.1.0" }], ports = [{ port = 80 }] }]
//! ```
//!
//! Each record kind is relisted independently on file events and on every
//! resync period.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};

use crate::config::RegistryConfig;
use crate::lifecycle::ShutdownSignal;
use crate::node::ResourceVersion;
use crate::observability::metrics;
use crate::registry::store::RegistryStore;
use crate::registry::types::{
    EndpointRecord, RecordKind, RegistryObject, RegistrySnapshot, ServiceRecord,
};
use crate::registry::{RegistryError, WatchSource};
use crate::resilience::Backoff;

/// On-disk registry layout.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegistryManifest {
    pub services: Vec<ServiceRecord>,
    pub endpoints: Vec<EndpointRecord>,
}

/// Read and parse a registry manifest.
pub fn load_manifest(path: &Path) -> Result<RegistryManifest, RegistryError> {
    let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| RegistryError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Watch source backed by a manifest file.
pub struct FileWatchSource {
    path: PathBuf,
    store: Arc<RegistryStore>,
    resync_period: Duration,
    backoff: Backoff,
    started: AtomicBool,
}

impl FileWatchSource {
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            path: PathBuf::from(&config.path),
            store: Arc::new(RegistryStore::new(config.namespace.clone())),
            resync_period: Duration::from_secs(config.resync_secs),
            backoff: Backoff::from_millis(config.retry_base_delay_ms, config.retry_max_delay_ms),
            started: AtomicBool::new(false),
        }
    }

    /// The mirror this source feeds.
    pub fn store(&self) -> Arc<RegistryStore> {
        self.store.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Install a directory watcher that forwards events touching our file.
    ///
    /// The parent directory is watched so that atomic renames (editors,
    /// mounted config volumes) are seen too.
    fn install_watcher(&self) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<()>), RegistryError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let file_name = self.path.file_name().map(|n| n.to_os_string());

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = event.paths.iter().any(|p| p.file_name() == file_name.as_deref());
                    if relevant && (event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove()) {
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = %e, "Registry watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        Ok((watcher, rx))
    }
}

/// Relist both kinds from disk into the store.
fn relist(path: &Path, store: &RegistryStore) -> Result<(), RegistryError> {
    let manifest = load_manifest(path)?;

    let services = manifest.services.into_iter().map(RegistryObject::Service).collect();
    let endpoints = manifest.endpoints.into_iter().map(RegistryObject::Endpoints).collect();

    let services_changed = store.replace(RecordKind::Service, services);
    let endpoints_changed = store.replace(RecordKind::Endpoints, endpoints);

    if services_changed || endpoints_changed {
        let (svc_count, ep_count) = store.len();
        tracing::debug!(
            services = svc_count,
            endpoints = ep_count,
            version = store.resource_version(),
            "Registry mirror updated"
        );
        metrics::record_registry_version(store.resource_version());
    }
    Ok(())
}

impl WatchSource for FileWatchSource {
    fn start(&self, mut shutdown: ShutdownSignal) -> Result<(), RegistryError> {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!(path = ?self.path, "Registry watch already started");
            return Ok(());
        }

        let (watcher, mut events) = self.install_watcher()?;
        let path = self.path.clone();
        let store = self.store.clone();
        let backoff = self.backoff;
        let resync_period = self.resync_period;

        tokio::spawn(async move {
            // Keep the OS watcher alive for as long as the task runs.
            let _watcher = watcher;

            // Initial list, retried until it succeeds.
            let mut attempt = 0;
            loop {
                match relist(&path, &store) {
                    Ok(()) => break,
                    Err(e) => {
                        attempt += 1;
                        let delay = backoff.delay(attempt);
                        tracing::warn!(error = %e, attempt, delay = ?delay, "Initial registry list failed");
                        tokio::select! {
                            _ = time::sleep(delay) => {}
                            _ = shutdown.recv() => return,
                        }
                    }
                }
            }
            store.mark_synced();
            tracing::info!(path = ?path, "Registry synced");

            let mut resync = time::interval_at(time::Instant::now() + resync_period, resync_period);
            resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = resync.tick() => {
                        if let Err(e) = relist(&path, &store) {
                            tracing::warn!(error = %e, "Registry resync failed, keeping last mirror");
                        }
                    }
                    Some(()) = events.recv() => {
                        tracing::debug!(path = ?path, "Registry file change detected");
                        if let Err(e) = relist(&path, &store) {
                            tracing::warn!(error = %e, "Registry reload failed, keeping last mirror");
                        }
                    }
                    _ = shutdown.recv() => {
                        tracing::info!("Registry watch received shutdown signal, exiting loop");
                        break;
                    }
                }
            }
        });

        tracing::info!(path = ?self.path, resync = ?self.resync_period, "Registry watch started");
        Ok(())
    }

    fn has_synced(&self) -> bool {
        self.store.has_synced()
    }

    fn subscribe_synced(&self) -> watch::Receiver<bool> {
        self.store.subscribe_synced()
    }

    fn current_version(&self) -> ResourceVersion {
        self.store.current_version()
    }

    fn snapshot(&self) -> RegistrySnapshot {
        self.store.snapshot()
    }

    fn versioned_snapshot(&self) -> (ResourceVersion, RegistrySnapshot) {
        self.store.versioned_snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        std::fs::write(
            &path,
            r#"
[[services]]
name = "foo"
namespace = "default"
annotations = { domains = "*", port = "http" }

[[endpoints]]
name = "foo"
namespace = "default"
subsets = [{ addresses = [{ ip = "10.1.1.0" }], ports = [{ name = "http", port = 8080 }] }]
"#,
        )
        .unwrap();

        let manifest = load_manifest(&path).unwrap();
        assert_eq!(manifest.services.len(), 1);
        assert_eq!(manifest.services[0].domain(), Some("*"));
        assert_eq!(manifest.endpoints[0].subsets[0].ports[0].port, 8080);
    }

    #[test]
    fn test_load_manifest_missing_file() {
        let err = load_manifest(Path::new("/nonexistent/registry.toml")).unwrap_err();
        assert!(matches!(err, RegistryError::Io { .. }));
    }

    #[test]
    fn test_load_manifest_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        std::fs::write(&path, "[[services]]\nnamespace = 1").unwrap();

        let err = load_manifest(&path).unwrap_err();
        assert!(matches!(err, RegistryError::Parse { .. }));
    }

    #[test]
    fn test_relist_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        std::fs::write(&path, "[[endpoints]]\nname = \"foo\"\nnamespace = \"default\"\n").unwrap();

        let store = RegistryStore::new("default");
        relist(&path, &store).unwrap();
        let version = store.current_version();
        relist(&path, &store).unwrap();
        assert_eq!(store.current_version(), version);
    }
}
