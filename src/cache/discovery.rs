//! Discovery request/response envelope and the subscribe handle.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::cache::store::SnapshotEntry;
use crate::node::{Node, ResourceVersion};
use crate::resources::{Resource, ResourceKind};

/// A pull or subscribe request for one resource kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryRequest {
    /// Version the caller already holds; empty on first request.
    pub version_info: ResourceVersion,
    pub node: Option<Node>,
    /// Restrict the response to these names; empty means all.
    pub resource_names: Vec<String>,
    pub type_url: String,
}

impl DiscoveryRequest {
    pub fn new(kind: ResourceKind) -> Self {
        Self {
            type_url: kind.type_url().to_string(),
            ..Self::default()
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.node = Some(node);
        self
    }

    pub fn with_version(mut self, version: impl Into<ResourceVersion>) -> Self {
        self.version_info = version.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    pub version_info: ResourceVersion,
    pub resources: Vec<Resource>,
    pub type_url: String,
    pub nonce: String,
}

/// Monotonic nonce source shared by fetches and watches.
#[derive(Debug, Default)]
pub(crate) struct NonceCounter(AtomicU64);

impl NonceCounter {
    pub(crate) fn next(&self) -> String {
        (self.0.fetch_add(1, Ordering::Relaxed) + 1).to_string()
    }
}

/// Slice one kind out of a published entry.
pub(crate) fn respond(entry: &SnapshotEntry, kind: ResourceKind, names: &[String], nonce: String) -> DiscoveryResponse {
    let items = &entry.bundle.resources(kind).items;
    let resources = if names.is_empty() {
        items.values().cloned().collect()
    } else {
        let wanted: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        items
            .iter()
            .filter(|(name, _)| wanted.contains(name.as_str()))
            .map(|(_, r)| r.clone())
            .collect()
    };

    DiscoveryResponse {
        version_info: entry.version.clone(),
        resources,
        type_url: kind.type_url().to_string(),
        nonce,
    }
}

/// Subscription to one node's snapshot for one resource kind.
///
/// Yields a response as soon as the node's version differs from the
/// version the subscriber last saw.
pub struct SnapshotWatch {
    rx: watch::Receiver<Option<Arc<SnapshotEntry>>>,
    kind: ResourceKind,
    request: DiscoveryRequest,
    nonces: Arc<NonceCounter>,
}

impl SnapshotWatch {
    pub(crate) fn new(
        rx: watch::Receiver<Option<Arc<SnapshotEntry>>>,
        kind: ResourceKind,
        request: DiscoveryRequest,
        nonces: Arc<NonceCounter>,
    ) -> Self {
        Self {
            rx,
            kind,
            request,
            nonces,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Version the next response must differ from.
    pub fn known_version(&self) -> &ResourceVersion {
        &self.request.version_info
    }

    /// Wait for the next version. `None` once the store is gone.
    pub async fn next(&mut self) -> Option<DiscoveryResponse> {
        loop {
            let current = self.rx.borrow_and_update().clone();
            if let Some(entry) = current {
                if entry.version != self.request.version_info {
                    let response = respond(&entry, self.kind, &self.request.resource_names, self.nonces.next());
                    self.request.version_info = entry.version.clone();
                    return Some(response);
                }
            }
            if self.rx.changed().await.is_err() {
                return None;
            }
        }
    }
}
