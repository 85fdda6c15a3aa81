//! The unit of publication.
//!
//! # Responsibilities
//! - Group resources into four collections tagged with one version
//! - Verify referential consistency before anything is published
//!
//! # Invariants
//! - Every route target is a cluster, every cluster has an assignment
//!   of the same name, and no assignment is orphaned
//! - Every route table a listener references exists, and none is unreferenced
//! - All four collections carry the bundle's version

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use crate::node::ResourceVersion;
use crate::resources::{Resource, ResourceKind};

/// Referential-consistency violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error("{kind} collection has version {actual:?}, bundle has {expected:?}")]
    VersionMismatch {
        kind: ResourceKind,
        expected: String,
        actual: String,
    },

    #[error("{kind} collection holds a {found} resource named {name:?}")]
    WrongKind {
        kind: ResourceKind,
        found: ResourceKind,
        name: String,
    },

    #[error("cluster {0:?} has no endpoint assignment")]
    MissingEndpoints(String),

    #[error("endpoint assignment {0:?} has no cluster")]
    OrphanedEndpoints(String),

    #[error("route table {route_config:?} targets unknown cluster {cluster:?}")]
    UnknownCluster { route_config: String, cluster: String },

    #[error("listener {listener:?} references unknown route table {route_config:?}")]
    MissingRouteConfig { listener: String, route_config: String },

    #[error("route table {0:?} is not referenced by any listener")]
    UnreferencedRouteConfig(String),
}

/// A versioned, name-keyed collection of one resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resources {
    pub version: ResourceVersion,
    pub items: BTreeMap<String, Resource>,
}

impl Resources {
    pub fn new(version: ResourceVersion, items: Vec<Resource>) -> Self {
        Self {
            version,
            items: items
                .into_iter()
                .map(|r| (r.name().to_string(), r))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(String::as_str)
    }
}

/// Endpoint assignments, clusters, route tables and listeners at one version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceBundle {
    pub endpoints: Resources,
    pub clusters: Resources,
    pub routes: Resources,
    pub listeners: Resources,
}

impl ResourceBundle {
    pub fn new(
        version: ResourceVersion,
        endpoints: Vec<Resource>,
        clusters: Vec<Resource>,
        routes: Vec<Resource>,
        listeners: Vec<Resource>,
    ) -> Self {
        Self {
            endpoints: Resources::new(version.clone(), endpoints),
            clusters: Resources::new(version.clone(), clusters),
            routes: Resources::new(version.clone(), routes),
            listeners: Resources::new(version, listeners),
        }
    }

    /// A bundle with four empty collections.
    pub fn empty(version: ResourceVersion) -> Self {
        Self::new(version, Vec::new(), Vec::new(), Vec::new(), Vec::new())
    }

    /// Version of the bundle (the endpoints collection's tag).
    pub fn version(&self) -> &ResourceVersion {
        &self.endpoints.version
    }

    pub fn resources(&self, kind: ResourceKind) -> &Resources {
        match kind {
            ResourceKind::Endpoints => &self.endpoints,
            ResourceKind::Clusters => &self.clusters,
            ResourceKind::Routes => &self.routes,
            ResourceKind::Listeners => &self.listeners,
        }
    }

    pub fn is_empty(&self) -> bool {
        ResourceKind::ALL.iter().all(|k| self.resources(*k).is_empty())
    }

    /// Check every invariant of a publishable bundle.
    pub fn consistent(&self) -> Result<(), ConsistencyError> {
        let version = self.version();
        for kind in ResourceKind::ALL {
            let collection = self.resources(kind);
            if &collection.version != version {
                return Err(ConsistencyError::VersionMismatch {
                    kind,
                    expected: version.to_string(),
                    actual: collection.version.to_string(),
                });
            }
            for resource in collection.items.values() {
                if resource.kind() != kind {
                    return Err(ConsistencyError::WrongKind {
                        kind,
                        found: resource.kind(),
                        name: resource.name().to_string(),
                    });
                }
            }
        }

        for name in self.clusters.names() {
            if !self.endpoints.items.contains_key(name) {
                return Err(ConsistencyError::MissingEndpoints(name.to_string()));
            }
        }
        for name in self.endpoints.names() {
            if !self.clusters.items.contains_key(name) {
                return Err(ConsistencyError::OrphanedEndpoints(name.to_string()));
            }
        }

        for resource in self.routes.items.values() {
            if let Resource::Route(table) = resource {
                for cluster in table.clusters() {
                    if !self.clusters.items.contains_key(cluster) {
                        return Err(ConsistencyError::UnknownCluster {
                            route_config: table.name.clone(),
                            cluster: cluster.to_string(),
                        });
                    }
                }
            }
        }

        let mut referenced = BTreeSet::new();
        for resource in self.listeners.items.values() {
            if let Resource::Listener(listener) = resource {
                for route_config in listener.route_config_names() {
                    if !self.routes.items.contains_key(route_config) {
                        return Err(ConsistencyError::MissingRouteConfig {
                            listener: listener.name.clone(),
                            route_config: route_config.to_string(),
                        });
                    }
                    referenced.insert(route_config);
                }
            }
        }
        for name in self.routes.names() {
            if !referenced.contains(name) {
                return Err(ConsistencyError::UnreferencedRouteConfig(name.to_string()));
            }
        }

        Ok(())
    }

    /// Resource count per collection, in [`ResourceKind::ALL`] order.
    pub fn counts(&self) -> [(ResourceKind, usize); 4] {
        ResourceKind::ALL.map(|k| (k, self.resources(k).len()))
    }
}
