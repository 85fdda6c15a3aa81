//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use kds::cache::{SnapshotSink, SnapshotStore, StoreError};
use kds::node::ResourceVersion;
use kds::registry::{
    EndpointAddress, EndpointPort, EndpointRecord, EndpointSubset, RegistryObject, RegistryStore,
    ServiceRecord,
};
use kds::resources::ResourceBundle;

pub const NAMESPACE: &str = "default";

/// A service routed under `domain`.
pub fn service(name: &str, domain: &str) -> ServiceRecord {
    ServiceRecord::new(name, NAMESPACE).with_annotation("domains", domain)
}

pub fn subset(ips: &[&str], ports: &[(&str, u16)]) -> EndpointSubset {
    EndpointSubset {
        addresses: ips.iter().map(|ip| EndpointAddress::new(*ip)).collect(),
        ports: ports.iter().map(|(name, port)| EndpointPort::new(*name, *port)).collect(),
    }
}

/// An endpoint record with a single subset.
pub fn endpoints(name: &str, ips: &[&str], ports: &[(&str, u16)]) -> EndpointRecord {
    EndpointRecord::new(name, NAMESPACE).with_subset(subset(ips, ports))
}

/// Registry holding service `foo` (`domains=*`) and its single endpoint
/// `10.1.1.0:80`, already synced.
pub fn foo_registry() -> Arc<RegistryStore> {
    let registry = Arc::new(RegistryStore::new(NAMESPACE));
    registry.apply(RegistryObject::Service(service("foo", "*")));
    registry.apply(RegistryObject::Endpoints(endpoints("foo", &["10.1.1.0"], &[("", 80)])));
    registry.mark_synced();
    registry
}

/// Snapshot sink that counts calls and forwards to a real store.
#[derive(Default)]
pub struct CountingSink {
    pub store: SnapshotStore,
    checks: AtomicUsize,
    updates: AtomicUsize,
}

impl CountingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

impl SnapshotSink for CountingSink {
    fn should_update(&self, node: &str, version: &ResourceVersion) -> bool {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.store.should_update(node, version)
    }

    fn update(&self, node: &str, version: ResourceVersion, bundle: ResourceBundle) -> Result<(), StoreError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.store.update(node, version, bundle)
    }
}
