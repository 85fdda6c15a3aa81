//! Resource graph builder.
//!
//! # Data Flow
//! ```text
//! services + endpoints (registry snapshot)
//!     → join endpoints to services by namespace and name
//!     → skip services without a routing domain
//!     → per (subset, port): endpoint assignment + EDS cluster
//!     → apply connect_timeout / lb_policy annotations
//!     → group routes by domain into virtual hosts (one route table)
//!     → one listener referencing the route table by name
//!     → ResourceBundle, checked for consistency
//! ```
//!
//! # Design Decisions
//! - Pure function of its inputs: same records and version give an equal bundle
//! - Any error aborts the whole build; there is no partial bundle
//! - Full recompute on every call, no deltas
//! - Two records that synthesize the same resource name fail the build

pub mod duration;

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use thiserror::Error;

use crate::node::ResourceVersion;
use crate::registry::types::{
    object_key, EndpointPort, EndpointRecord, EndpointSubset, ServiceRecord, ANNOTATION_CONNECT_TIMEOUT,
    ANNOTATION_LB_POLICY, ANNOTATION_PORT,
};
use crate::resources::{
    Address, Cluster, ClusterLoadAssignment, ConsistencyError, LbEndpoint, LbPolicy, Listener,
    Resource, ResourceBundle, Route, RouteConfiguration, VirtualHost,
};

pub use duration::{parse_duration, DurationError};

/// Name of the single route table and of the listener.
pub const ROUTE_CONFIG_NAME: &str = "kds";
pub const LISTENER_NAME: &str = "kds";

/// Where the synthesized listener binds.
pub const LISTENER_ADDRESS: &str = "0.0.0.0";
pub const LISTENER_PORT: u32 = 10000;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Separator between endpoint name and port name in resource names.
pub const PORT_SEPARATOR: &str = "__";

/// Reasons a bundle could not be built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("subset of endpoint is empty (service {service:?})")]
    EmptyEndpointSubset { service: String },

    #[error("cannot find a port (service {service:?})")]
    NoPort { service: String },

    #[error("invalid connect timeout {value:?} (service {service:?}): {source}")]
    InvalidConnectTimeout {
        service: String,
        value: String,
        #[source]
        source: DurationError,
    },

    #[error("resource {name:?} is produced by both {first} and {second}")]
    DuplicateResource {
        name: String,
        first: String,
        second: String,
    },

    #[error("inconsistent bundle: {0}")]
    Inconsistent(#[from] ConsistencyError),
}

/// Resource name for an endpoint record exposed on `port_name`.
pub fn resource_name(endpoint: &str, port_name: &str) -> String {
    if port_name.is_empty() {
        endpoint.to_string()
    } else {
        format!("{}{}{}", endpoint, PORT_SEPARATOR, port_name)
    }
}

/// Ports of `subset` to expose.
///
/// With a selector, the port of that name, or the first port when no name
/// matches. Without one, every port. `None` when the subset has no ports.
fn select_ports<'a>(subset: &'a EndpointSubset, selector: Option<&str>) -> Option<Vec<&'a EndpointPort>> {
    let first = subset.ports.first()?;
    match selector {
        Some(name) => {
            let port = subset.ports.iter().find(|p| p.name == name).unwrap_or(first);
            Some(vec![port])
        }
        None => Some(subset.ports.iter().collect()),
    }
}

/// Per-service cluster settings, parsed once per service.
struct ClusterSettings {
    connect_timeout: Duration,
    lb_policy: LbPolicy,
}

impl ClusterSettings {
    fn from_service(svc: &ServiceRecord) -> Result<Self, BuildError> {
        let connect_timeout = match svc.annotation(ANNOTATION_CONNECT_TIMEOUT) {
            Some(value) => parse_duration(value).map_err(|source| BuildError::InvalidConnectTimeout {
                service: svc.name.clone(),
                value: value.to_string(),
                source,
            })?,
            None => DEFAULT_CONNECT_TIMEOUT,
        };

        let lb_policy = match svc.annotation(ANNOTATION_LB_POLICY) {
            Some(name) => LbPolicy::from_name(name).unwrap_or_else(|| {
                tracing::debug!(service = %svc.name, lb_policy = %name, "Ignoring unknown lb_policy");
                LbPolicy::default()
            }),
            None => LbPolicy::default(),
        };

        Ok(Self {
            connect_timeout,
            lb_policy,
        })
    }

    fn cluster(&self, name: &str) -> Cluster {
        let mut cluster = Cluster::eds(name, self.connect_timeout);
        cluster.lb_policy = self.lb_policy;
        cluster
    }
}

/// Endpoint assignments of one endpoint record, in first-seen order.
fn assignments_for(svc: &ServiceRecord, ep: &EndpointRecord) -> Result<Vec<ClusterLoadAssignment>, BuildError> {
    if ep.subsets.is_empty() {
        return Err(BuildError::EmptyEndpointSubset {
            service: svc.name.clone(),
        });
    }

    let selector = svc.annotation(ANNOTATION_PORT).filter(|p| !p.is_empty());
    let mut assignments: Vec<ClusterLoadAssignment> = Vec::new();

    for subset in &ep.subsets {
        let ports = select_ports(subset, selector).ok_or_else(|| BuildError::NoPort {
            service: svc.name.clone(),
        })?;

        for port in ports {
            let name = resource_name(&ep.name, &port.name);
            let backends = subset
                .addresses
                .iter()
                .map(|addr| LbEndpoint::new(addr.ip.clone(), u32::from(port.port)));

            let idx = match assignments.iter().position(|a| a.cluster_name == name) {
                Some(idx) => idx,
                None => {
                    assignments.push(ClusterLoadAssignment::new(name));
                    assignments.len() - 1
                }
            };
            assignments[idx].endpoints[0].lb_endpoints.extend(backends);
        }
    }

    Ok(assignments)
}

/// Translate registry records into a consistent bundle tagged with `version`.
pub fn build(
    services: &[ServiceRecord],
    endpoints: &[EndpointRecord],
    version: impl Into<ResourceVersion>,
) -> Result<ResourceBundle, BuildError> {
    let version = version.into();
    let svc_map: HashMap<(&str, &str), &ServiceRecord> = services
        .iter()
        .map(|svc| ((svc.namespace.as_str(), svc.name.as_str()), svc))
        .collect();
    // resource name -> endpoint record that produced it
    let mut owners: HashMap<String, String> = HashMap::new();

    let mut assignments: Vec<Resource> = Vec::new();
    let mut clusters: Vec<Resource> = Vec::new();
    let mut routes_by_domain: BTreeMap<&str, Vec<Route>> = BTreeMap::new();

    for ep in endpoints {
        let Some(svc) = svc_map.get(&(ep.namespace.as_str(), ep.name.as_str())) else {
            continue;
        };
        let Some(domain) = svc.domain() else {
            continue;
        };

        let settings = ClusterSettings::from_service(svc)?;
        let record = object_key(&ep.namespace, &ep.name);
        for assignment in assignments_for(svc, ep)? {
            let name = assignment.cluster_name.clone();
            if let Some(first) = owners.insert(name.clone(), record.clone()) {
                return Err(BuildError::DuplicateResource {
                    name,
                    first,
                    second: record,
                });
            }
            clusters.push(settings.cluster(&name).into());
            routes_by_domain
                .entry(domain)
                .or_default()
                .push(Route::prefix("/", name));
            assignments.push(assignment.into());
        }
    }

    let mut route_tables: Vec<Resource> = Vec::new();
    let mut listeners: Vec<Resource> = Vec::new();

    if !routes_by_domain.is_empty() {
        let virtual_hosts = routes_by_domain
            .into_iter()
            .map(|(domain, routes)| VirtualHost {
                name: domain.to_string(),
                domains: vec![domain.to_string()],
                routes,
            })
            .collect();

        route_tables.push(
            RouteConfiguration {
                name: ROUTE_CONFIG_NAME.to_string(),
                virtual_hosts,
            }
            .into(),
        );
        listeners.push(
            Listener::http(
                LISTENER_NAME,
                Address::socket(LISTENER_ADDRESS, LISTENER_PORT),
                ROUTE_CONFIG_NAME,
            )
            .into(),
        );
    }

    let bundle = ResourceBundle::new(version, assignments, clusters, route_tables, listeners);
    bundle.consistent()?;
    Ok(bundle)
}
