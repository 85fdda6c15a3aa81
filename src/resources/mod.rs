//! Data-plane resource model.
//!
//! # Data Flow
//! ```text
//! builder
//!     → types.rs (assignments, clusters, route table, listener)
//!     → bundle.rs (four versioned collections + consistency check)
//!     → snapshot store
//!     → discovery server (serialized with an "@type" discriminator)
//! ```

pub mod bundle;
pub mod types;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use bundle::{ConsistencyError, ResourceBundle, Resources};
pub use types::{
    Address, Cluster, ClusterLoadAssignment, LbEndpoint, LbPolicy, Listener, Route,
    RouteConfiguration, VirtualHost,
};

pub const ENDPOINT_TYPE_URL: &str = "type.googleapis.com/envoy.api.v2.ClusterLoadAssignment";
pub const CLUSTER_TYPE_URL: &str = "type.googleapis.com/envoy.api.v2.Cluster";
pub const ROUTE_TYPE_URL: &str = "type.googleapis.com/envoy.api.v2.RouteConfiguration";
pub const LISTENER_TYPE_URL: &str = "type.googleapis.com/envoy.api.v2.Listener";

/// The four resource collections of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Endpoints,
    Clusters,
    Routes,
    Listeners,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Endpoints,
        ResourceKind::Clusters,
        ResourceKind::Routes,
        ResourceKind::Listeners,
    ];

    pub fn type_url(&self) -> &'static str {
        match self {
            ResourceKind::Endpoints => ENDPOINT_TYPE_URL,
            ResourceKind::Clusters => CLUSTER_TYPE_URL,
            ResourceKind::Routes => ROUTE_TYPE_URL,
            ResourceKind::Listeners => LISTENER_TYPE_URL,
        }
    }

    pub fn from_type_url(type_url: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_url() == type_url)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Endpoints => "endpoints",
            ResourceKind::Clusters => "clusters",
            ResourceKind::Routes => "routes",
            ResourceKind::Listeners => "listeners",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown resource kind: {}", s))
    }
}

/// A single named resource of any kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum Resource {
    #[serde(rename = "type.googleapis.com/envoy.api.v2.ClusterLoadAssignment")]
    Endpoints(ClusterLoadAssignment),
    #[serde(rename = "type.googleapis.com/envoy.api.v2.Cluster")]
    Cluster(Cluster),
    #[serde(rename = "type.googleapis.com/envoy.api.v2.RouteConfiguration")]
    Route(RouteConfiguration),
    #[serde(rename = "type.googleapis.com/envoy.api.v2.Listener")]
    Listener(Listener),
}

impl Resource {
    /// The name the resource is addressed by.
    pub fn name(&self) -> &str {
        match self {
            Resource::Endpoints(cla) => &cla.cluster_name,
            Resource::Cluster(c) => &c.name,
            Resource::Route(r) => &r.name,
            Resource::Listener(l) => &l.name,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            Resource::Endpoints(_) => ResourceKind::Endpoints,
            Resource::Cluster(_) => ResourceKind::Clusters,
            Resource::Route(_) => ResourceKind::Routes,
            Resource::Listener(_) => ResourceKind::Listeners,
        }
    }
}

impl From<ClusterLoadAssignment> for Resource {
    fn from(r: ClusterLoadAssignment) -> Self {
        Resource::Endpoints(r)
    }
}

impl From<Cluster> for Resource {
    fn from(r: Cluster) -> Self {
        Resource::Cluster(r)
    }
}

impl From<RouteConfiguration> for Resource {
    fn from(r: RouteConfiguration) -> Self {
        Resource::Route(r)
    }
}

impl From<Listener> for Resource {
    fn from(r: Listener) -> Self {
        Resource::Listener(r)
    }
}
