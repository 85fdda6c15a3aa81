//! In-memory mirror of the registry.
//!
//! # Responsibilities
//! - Hold the latest service and endpoint records
//! - Advance a resource-version cursor on every effective change
//! - Publish the "synced" flag once the initial list has been applied
//!
//! # Design Decisions
//! - Copy-on-write state behind `ArcSwap`: readers never block, writers replace
//! - Writers are serialized by a mutex so cursors advance monotonically
//! - Re-applying identical records (resync) leaves every cursor untouched
//! - Versions carry a per-store generation seeded from the wall clock, so a
//!   restarted process never reissues a version an earlier one published

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;
use tokio::sync::watch;

use crate::node::ResourceVersion;
use crate::registry::types::{
    object_key, EndpointRecord, RecordKind, RegistryObject, RegistrySnapshot, ServiceRecord,
};
use crate::registry::{RegistryError, WatchSource};
use crate::lifecycle::ShutdownSignal;

#[derive(Debug, Clone, Default)]
struct RegistryState {
    services: BTreeMap<String, ServiceRecord>,
    endpoints: BTreeMap<String, EndpointRecord>,
    /// Global counter, bumped on every effective change of either kind.
    resource_version: u64,
    /// Counter value of the last change to services.
    services_version: u64,
    /// Counter value of the last change to endpoints.
    endpoints_version: u64,
}

impl RegistryState {
    fn endpoints_version(&self, generation: u64) -> ResourceVersion {
        ResourceVersion::new(format!("{}.{}", generation, self.endpoints_version))
    }

    fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            services: self.services.values().cloned().collect(),
            endpoints: self.endpoints.values().cloned().collect(),
        }
    }

    fn bump(&mut self, kind: RecordKind) {
        self.resource_version += 1;
        match kind {
            RecordKind::Service => self.services_version = self.resource_version,
            RecordKind::Endpoints => self.endpoints_version = self.resource_version,
        }
    }
}

/// Wall-clock nanoseconds, strictly increasing within the process.
fn next_generation() -> u64 {
    static LAST: AtomicU64 = AtomicU64::new(0);

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let prev = LAST
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(now.max(last + 1)))
        .unwrap_or_else(|last| last);
    now.max(prev + 1)
}

/// Queryable mirror of service and endpoint records.
pub struct RegistryStore {
    state: ArcSwap<RegistryState>,
    write_lock: Mutex<()>,
    synced: watch::Sender<bool>,
    namespace: String,
    generation: u64,
}

impl RegistryStore {
    /// Create an empty store scoped to `namespace` (empty = every namespace).
    pub fn new(namespace: impl Into<String>) -> Self {
        let (synced, _) = watch::channel(false);
        Self {
            state: ArcSwap::from_pointee(RegistryState::default()),
            write_lock: Mutex::new(()),
            synced,
            namespace: namespace.into(),
            generation: next_generation(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn in_scope(&self, namespace: &str) -> bool {
        self.namespace.is_empty() || self.namespace == namespace
    }

    fn mutate<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut RegistryState) -> bool,
    {
        let _guard = self.write_lock.lock().expect("registry write lock poisoned");
        let mut next = RegistryState::clone(&self.state.load());
        let changed = f(&mut next);
        if changed {
            self.state.store(Arc::new(next));
        }
        changed
    }

    /// Insert or replace a single record. Returns true if anything changed.
    pub fn apply(&self, object: RegistryObject) -> bool {
        if !self.in_scope(object.namespace()) {
            tracing::trace!(key = %object.key(), "Ignoring record outside namespace scope");
            return false;
        }

        let key = object.key();
        let kind = object.kind();
        self.mutate(|state| {
            let changed = match object {
                RegistryObject::Service(svc) => {
                    if state.services.get(&key) == Some(&svc) {
                        false
                    } else {
                        state.services.insert(key, svc);
                        true
                    }
                }
                RegistryObject::Endpoints(ep) => {
                    if state.endpoints.get(&key) == Some(&ep) {
                        false
                    } else {
                        state.endpoints.insert(key, ep);
                        true
                    }
                }
            };
            if changed {
                state.bump(kind);
            }
            changed
        })
    }

    /// Remove a record by kind, namespace and name.
    pub fn delete(&self, kind: RecordKind, namespace: &str, name: &str) -> bool {
        let key = object_key(namespace, name);
        self.mutate(|state| {
            let removed = match kind {
                RecordKind::Service => state.services.remove(&key).is_some(),
                RecordKind::Endpoints => state.endpoints.remove(&key).is_some(),
            };
            if removed {
                state.bump(kind);
            }
            removed
        })
    }

    /// Replace every record of `kind` with a freshly listed set.
    ///
    /// Objects of the other kind or outside the namespace scope are skipped.
    pub fn replace(&self, kind: RecordKind, objects: Vec<RegistryObject>) -> bool {
        let mut services = BTreeMap::new();
        let mut endpoints = BTreeMap::new();
        for object in objects {
            if object.kind() != kind || !self.in_scope(object.namespace()) {
                continue;
            }
            let key = object.key();
            match object {
                RegistryObject::Service(svc) => {
                    services.insert(key, svc);
                }
                RegistryObject::Endpoints(ep) => {
                    endpoints.insert(key, ep);
                }
            }
        }

        self.mutate(|state| {
            let changed = match kind {
                RecordKind::Service if state.services != services => {
                    state.services = services;
                    true
                }
                RecordKind::Endpoints if state.endpoints != endpoints => {
                    state.endpoints = endpoints;
                    true
                }
                _ => false,
            };
            if changed {
                state.bump(kind);
            }
            changed
        })
    }

    /// Flag the initial list as applied. Idempotent.
    pub fn mark_synced(&self) {
        self.synced.send_if_modified(|synced| {
            let was = *synced;
            *synced = true;
            !was
        });
    }

    /// Cursor of the last change to records of `kind`.
    pub fn kind_version(&self, kind: RecordKind) -> u64 {
        let state = self.state.load();
        match kind {
            RecordKind::Service => state.services_version,
            RecordKind::Endpoints => state.endpoints_version,
        }
    }

    /// Global counter across both kinds.
    pub fn resource_version(&self) -> u64 {
        self.state.load().resource_version
    }

    /// Prefix of every version this store reports.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> (usize, usize) {
        let state = self.state.load();
        (state.services.len(), state.endpoints.len())
    }
}

impl WatchSource for RegistryStore {
    /// The store is fed directly; there is nothing to start.
    fn start(&self, _shutdown: ShutdownSignal) -> Result<(), RegistryError> {
        Ok(())
    }

    fn has_synced(&self) -> bool {
        *self.synced.borrow()
    }

    fn subscribe_synced(&self) -> watch::Receiver<bool> {
        self.synced.subscribe()
    }

    /// Only the endpoints cursor feeds the version, so a service-only edit
    /// surfaces with the next endpoints change.
    fn current_version(&self) -> ResourceVersion {
        self.state.load().endpoints_version(self.generation)
    }

    fn snapshot(&self) -> RegistrySnapshot {
        self.state.load().snapshot()
    }

    fn versioned_snapshot(&self) -> (ResourceVersion, RegistrySnapshot) {
        let state = self.state.load();
        (state.endpoints_version(self.generation), state.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::types::{EndpointAddress, EndpointPort, EndpointSubset};

    fn endpoints(name: &str, ip: &str) -> RegistryObject {
        RegistryObject::Endpoints(EndpointRecord::new(name, "default").with_subset(
            EndpointSubset {
                addresses: vec![EndpointAddress::new(ip)],
                ports: vec![EndpointPort::new("", 80)],
            },
        ))
    }

    fn version(store: &RegistryStore, cursor: u64) -> ResourceVersion {
        ResourceVersion::new(format!("{}.{}", store.generation(), cursor))
    }

    #[test]
    fn test_apply_advances_endpoint_cursor() {
        let store = RegistryStore::new("default");
        assert_eq!(store.current_version(), version(&store, 0));

        assert!(store.apply(endpoints("foo", "10.0.0.1")));
        assert_eq!(store.current_version(), version(&store, 1));

        // identical record is a no-op
        assert!(!store.apply(endpoints("foo", "10.0.0.1")));
        assert_eq!(store.current_version(), version(&store, 1));

        assert!(store.apply(endpoints("foo", "10.0.0.2")));
        assert_eq!(store.current_version(), version(&store, 2));
    }

    #[test]
    fn test_restarted_store_never_reuses_versions() {
        let first = RegistryStore::new("default");
        first.apply(endpoints("foo", "10.1.1.0"));
        first.apply(endpoints("foo", "10.1.1.1"));

        // same number of changes, different content
        let second = RegistryStore::new("default");
        second.apply(endpoints("foo", "10.2.2.2"));
        second.apply(endpoints("foo", "10.2.2.3"));

        assert_eq!(first.kind_version(RecordKind::Endpoints), second.kind_version(RecordKind::Endpoints));
        assert_ne!(first.current_version(), second.current_version());
        assert!(second.generation() > first.generation());
    }

    #[test]
    fn test_versioned_snapshot_matches_state() {
        let store = RegistryStore::new("default");
        store.apply(endpoints("foo", "10.0.0.1"));

        let (v, snapshot) = store.versioned_snapshot();
        assert_eq!(v, store.current_version());
        assert_eq!(snapshot.endpoints[0].subsets[0].addresses[0].ip, "10.0.0.1");

        store.apply(endpoints("foo", "10.0.0.2"));
        let (next, snapshot) = store.versioned_snapshot();
        assert_ne!(next, v);
        assert_eq!(snapshot.endpoints[0].subsets[0].addresses[0].ip, "10.0.0.2");
    }

    #[test]
    fn test_service_change_does_not_move_version() {
        let store = RegistryStore::new("");
        store.apply(endpoints("foo", "10.0.0.1"));
        let before = store.current_version();

        let svc = ServiceRecord::new("foo", "default").with_annotation("domains", "*");
        assert!(store.apply(RegistryObject::Service(svc)));

        assert_eq!(store.current_version(), before);
        assert_eq!(store.kind_version(RecordKind::Service), 2);
        assert_eq!(store.resource_version(), 2);
    }

    #[test]
    fn test_namespace_scope() {
        let store = RegistryStore::new("prod");
        let obj = RegistryObject::Service(ServiceRecord::new("foo", "staging"));
        assert!(!store.apply(obj));
        assert_eq!(store.len(), (0, 0));
    }

    #[test]
    fn test_replace_and_delete() {
        let store = RegistryStore::new("default");
        let listed = vec![endpoints("a", "10.0.0.1"), endpoints("b", "10.0.0.2")];
        assert!(store.replace(RecordKind::Endpoints, listed.clone()));
        assert!(!store.replace(RecordKind::Endpoints, listed));
        assert_eq!(store.len(), (0, 2));

        assert!(store.delete(RecordKind::Endpoints, "default", "a"));
        assert!(!store.delete(RecordKind::Endpoints, "default", "a"));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.endpoints.len(), 1);
        assert_eq!(snapshot.endpoints[0].name, "b");
    }

    #[test]
    fn test_mark_synced() {
        let store = RegistryStore::new("default");
        let rx = store.subscribe_synced();
        assert!(!store.has_synced());

        store.mark_synced();
        store.mark_synced();
        assert!(store.has_synced());
        assert!(*rx.borrow());
    }

    #[test]
    fn test_snapshot_is_point_in_time() {
        let store = RegistryStore::new("default");
        store.apply(endpoints("foo", "10.0.0.1"));
        let snapshot = store.snapshot();

        store.apply(endpoints("foo", "10.0.0.9"));
        assert_eq!(snapshot.endpoints[0].subsets[0].addresses[0].ip, "10.0.0.1");
    }
}
