//! Per-node snapshot table.
//!
//! # Invariants
//! - A node's entry is only ever replaced whole, after validation
//! - Readers and subscribers never observe a bundle that failed validation
//! - Updates for one node are applied in the order their writers acquire the node's lock
//! - Slots with nothing published and nobody watching are dropped on the next insert

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::watch;

use crate::cache::discovery::{respond, DiscoveryRequest, DiscoveryResponse, NonceCounter, SnapshotWatch};
use crate::cache::{SnapshotSink, StoreError};
use crate::node::{NodeHash, ResourceVersion};
use crate::observability::metrics;
use crate::resources::{ResourceBundle, ResourceKind};

/// A published bundle for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub version: ResourceVersion,
    pub bundle: ResourceBundle,
    pub published_at: SystemTime,
}

impl SnapshotEntry {
    pub fn published_at_unix(&self) -> u64 {
        self.published_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

type EntryCell = Option<Arc<SnapshotEntry>>;

struct NodeSlot {
    writer: Mutex<()>,
    current: watch::Sender<EntryCell>,
}

impl NodeSlot {
    fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            writer: Mutex::new(()),
            current,
        }
    }

    fn entry(&self) -> EntryCell {
        self.current.borrow().clone()
    }

    fn is_idle(self: &Arc<Self>) -> bool {
        Arc::strong_count(self) == 1 && self.current.receiver_count() == 0 && self.current.borrow().is_none()
    }
}

/// Latest bundle per node, with fetch and subscribe access.
pub struct SnapshotStore {
    nodes: RwLock<HashMap<String, Arc<NodeSlot>>>,
    nonces: Arc<NonceCounter>,
    hash: NodeHash,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            nonces: Arc::new(NonceCounter::default()),
            hash: NodeHash,
        }
    }

    fn slot(&self, node: &str) -> Option<Arc<NodeSlot>> {
        self.nodes
            .read()
            .expect("snapshot table lock poisoned")
            .get(node)
            .cloned()
    }

    fn slot_or_insert(&self, node: &str) -> Arc<NodeSlot> {
        if let Some(slot) = self.slot(node) {
            return slot;
        }
        let mut table = self.nodes.write().expect("snapshot table lock poisoned");
        if !table.contains_key(node) {
            table.retain(|_, slot| !slot.is_idle());
        }
        table
            .entry(node.to_string())
            .or_insert_with(|| Arc::new(NodeSlot::new()))
            .clone()
    }

    /// Slots held, including unpublished ones kept alive by watchers.
    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.nodes.read().expect("snapshot table lock poisoned").len()
    }

    /// Current entry for `node`, if anything was published.
    pub fn get(&self, node: &str) -> Option<Arc<SnapshotEntry>> {
        self.slot(node).and_then(|slot| slot.entry())
    }

    /// Nodes with a published entry, sorted.
    pub fn nodes(&self) -> Vec<String> {
        let table = self.nodes.read().expect("snapshot table lock poisoned");
        let mut nodes: Vec<String> = table
            .iter()
            .filter(|(_, slot)| slot.current.borrow().is_some())
            .map(|(node, _)| node.clone())
            .collect();
        nodes.sort();
        nodes
    }

    /// Check that `bundle` can be served under `version`.
    pub fn validate(version: &ResourceVersion, bundle: &ResourceBundle) -> Result<(), StoreError> {
        if version.is_empty() {
            return Err(StoreError::EmptyVersion);
        }
        if bundle.version() != version {
            return Err(StoreError::VersionMismatch {
                expected: version.to_string(),
                actual: bundle.version().to_string(),
            });
        }
        for kind in ResourceKind::ALL {
            if bundle.resources(kind).names().any(str::is_empty) {
                return Err(StoreError::UnnamedResource { kind });
            }
        }
        bundle.consistent()?;
        Ok(())
    }

    fn kind_of(request: &DiscoveryRequest) -> Result<ResourceKind, StoreError> {
        ResourceKind::from_type_url(&request.type_url)
            .ok_or_else(|| StoreError::UnknownTypeUrl(request.type_url.clone()))
    }

    /// Point-in-time read of one kind for the requesting node.
    pub fn fetch(&self, request: &DiscoveryRequest) -> Result<DiscoveryResponse, StoreError> {
        let kind = Self::kind_of(request)?;
        let node = self.hash.id(request.node.as_ref());
        let entry = self.get(&node).ok_or_else(|| StoreError::NotFound(node.clone()))?;

        if entry.version == request.version_info {
            return Err(StoreError::UpToDate {
                node,
                version: entry.version.to_string(),
            });
        }
        Ok(respond(&entry, kind, &request.resource_names, self.nonces.next()))
    }

    /// Subscribe to the requesting node's snapshot.
    ///
    /// Works before the node's first publication; the watch then resolves
    /// with that first bundle.
    pub fn watch(&self, request: &DiscoveryRequest) -> Result<SnapshotWatch, StoreError> {
        let kind = Self::kind_of(request)?;
        let node = self.hash.id(request.node.as_ref());
        let rx = self.slot_or_insert(&node).current.subscribe();
        Ok(SnapshotWatch::new(rx, kind, request.clone(), self.nonces.clone()))
    }
}

impl SnapshotSink for SnapshotStore {
    fn should_update(&self, node: &str, version: &ResourceVersion) -> bool {
        match self.get(node) {
            Some(entry) => &entry.version != version,
            None => true,
        }
    }

    fn update(&self, node: &str, version: ResourceVersion, bundle: ResourceBundle) -> Result<(), StoreError> {
        Self::validate(&version, &bundle)?;

        let slot = self.slot_or_insert(node);
        let _writer = slot.writer.lock().expect("snapshot writer lock poisoned");

        metrics::record_publication(node, &bundle);
        let [(_, endpoints), (_, clusters), (_, routes), (_, listeners)] = bundle.counts();
        tracing::info!(
            node = %node,
            version = %version,
            endpoints,
            clusters,
            routes,
            listeners,
            "Snapshot published"
        );

        slot.current.send_replace(Some(Arc::new(SnapshotEntry {
            version,
            bundle,
            published_at: SystemTime::now(),
        })));
        Ok(())
    }
}
