//! Data-plane resource definitions.
//!
//! A JSON-serializable subset of the proxy's v2 API: enough to describe
//! endpoint assignments, EDS clusters, a route table and one HTTP listener.
//! Field names follow the proto field names so the JSON is accepted by the
//! proxy's REST discovery client.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Filter name of the HTTP connection manager network filter.
pub const HTTP_CONNECTION_MANAGER: &str = "envoy.http_connection_manager";

/// Filter name of the terminal router HTTP filter.
pub const ROUTER_FILTER: &str = "envoy.router";

pub const HTTP_CONNECTION_MANAGER_TYPE_URL: &str =
    "type.googleapis.com/envoy.config.filter.network.http_connection_manager.v2.HttpConnectionManager";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketAddress {
    pub address: String,
    pub port_value: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub socket_address: SocketAddress,
}

impl Address {
    pub fn socket(ip: impl Into<String>, port: u32) -> Self {
        Self {
            socket_address: SocketAddress {
                address: ip.into(),
                port_value: port,
            },
        }
    }
}

/// `{"ads": {}}`: fetch the referenced resource over the aggregated stream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedConfigSource {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSource {
    pub ads: AggregatedConfigSource,
}

impl ConfigSource {
    pub fn ads() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub address: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LbEndpoint {
    pub endpoint: Endpoint,
}

impl LbEndpoint {
    pub fn new(ip: impl Into<String>, port: u32) -> Self {
        Self {
            endpoint: Endpoint {
                address: Address::socket(ip, port),
            },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalityLbEndpoints {
    pub lb_endpoints: Vec<LbEndpoint>,
}

/// Endpoint-assignment resource: the backend addresses of one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterLoadAssignment {
    pub cluster_name: String,
    pub endpoints: Vec<LocalityLbEndpoints>,
}

impl ClusterLoadAssignment {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            endpoints: vec![LocalityLbEndpoints::default()],
        }
    }

    /// All backends across localities.
    pub fn lb_endpoints(&self) -> impl Iterator<Item = &LbEndpoint> {
        self.endpoints.iter().flat_map(|l| l.lb_endpoints.iter())
    }
}

/// Cluster load-balancing policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LbPolicy {
    #[default]
    RoundRobin,
    LeastRequest,
    RingHash,
    Random,
    Maglev,
    ClusterProvided,
}

impl LbPolicy {
    pub const ALL: [LbPolicy; 6] = [
        LbPolicy::RoundRobin,
        LbPolicy::LeastRequest,
        LbPolicy::RingHash,
        LbPolicy::Random,
        LbPolicy::Maglev,
        LbPolicy::ClusterProvided,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LbPolicy::RoundRobin => "ROUND_ROBIN",
            LbPolicy::LeastRequest => "LEAST_REQUEST",
            LbPolicy::RingHash => "RING_HASH",
            LbPolicy::Random => "RANDOM",
            LbPolicy::Maglev => "MAGLEV",
            LbPolicy::ClusterProvided => "CLUSTER_PROVIDED",
        }
    }

    /// Exact, case-sensitive lookup of an enumeration name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DnsLookupFamily {
    Auto,
    #[default]
    V4Only,
    V6Only,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscoveryType {
    Static,
    StrictDns,
    LogicalDns,
    #[default]
    Eds,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdsClusterConfig {
    pub eds_config: ConfigSource,
}

/// A backend pool, sourcing its members from the assignment of the same name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub name: String,

    #[serde(with = "proto_duration")]
    pub connect_timeout: Duration,

    pub lb_policy: LbPolicy,

    pub dns_lookup_family: DnsLookupFamily,

    #[serde(rename = "type")]
    pub discovery_type: DiscoveryType,

    pub eds_cluster_config: EdsClusterConfig,
}

impl Cluster {
    /// An ADS-sourced EDS cluster with default policy.
    pub fn eds(name: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            connect_timeout,
            lb_policy: LbPolicy::RoundRobin,
            dns_lookup_family: DnsLookupFamily::V4Only,
            discovery_type: DiscoveryType::Eds,
            eds_cluster_config: EdsClusterConfig {
                eds_config: ConfigSource::ads(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMatch {
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteAction {
    pub cluster: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    #[serde(rename = "match")]
    pub route_match: RouteMatch,
    pub route: RouteAction,
}

impl Route {
    pub fn prefix(prefix: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            route_match: RouteMatch {
                prefix: prefix.into(),
            },
            route: RouteAction {
                cluster: cluster.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualHost {
    pub name: String,
    pub domains: Vec<String>,
    pub routes: Vec<Route>,
}

/// The route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfiguration {
    pub name: String,
    pub virtual_hosts: Vec<VirtualHost>,
}

impl RouteConfiguration {
    /// Every cluster a route of this table forwards to.
    pub fn clusters(&self) -> impl Iterator<Item = &str> {
        self.virtual_hosts
            .iter()
            .flat_map(|vh| vh.routes.iter())
            .map(|r| r.route.cluster.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodecType {
    #[default]
    Auto,
    Http1,
    Http2,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rds {
    pub config_source: ConfigSource,
    pub route_config_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpFilter {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConnectionManager {
    #[serde(rename = "@type")]
    pub type_url: String,
    pub codec_type: CodecType,
    pub stat_prefix: String,
    pub rds: Rds,
    pub http_filters: Vec<HttpFilter>,
}

impl HttpConnectionManager {
    /// An HTTP manager that pulls its route table `route_config_name` over ADS.
    pub fn rds(route_config_name: impl Into<String>) -> Self {
        Self {
            type_url: HTTP_CONNECTION_MANAGER_TYPE_URL.to_string(),
            codec_type: CodecType::Auto,
            stat_prefix: "http".to_string(),
            rds: Rds {
                config_source: ConfigSource::ads(),
                route_config_name: route_config_name.into(),
            },
            http_filters: vec![HttpFilter {
                name: ROUTER_FILTER.to_string(),
            }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub name: String,
    pub typed_config: HttpConnectionManager,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterChain {
    pub filters: Vec<Filter>,
}

/// The network entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listener {
    pub name: String,
    pub address: Address,
    pub filter_chains: Vec<FilterChain>,
}

impl Listener {
    /// An HTTP listener whose route table is referenced by name, not embedded.
    pub fn http(name: impl Into<String>, address: Address, route_config_name: &str) -> Self {
        Self {
            name: name.into(),
            address,
            filter_chains: vec![FilterChain {
                filters: vec![Filter {
                    name: HTTP_CONNECTION_MANAGER.to_string(),
                    typed_config: HttpConnectionManager::rds(route_config_name),
                }],
            }],
        }
    }

    /// Route tables this listener pulls by name.
    pub fn route_config_names(&self) -> impl Iterator<Item = &str> {
        self.filter_chains
            .iter()
            .flat_map(|fc| fc.filters.iter())
            .map(|f| f.typed_config.rds.route_config_name.as_str())
    }
}

/// Protobuf JSON encoding of `google.protobuf.Duration` (`"1s"`, `"0.250s"`).
pub mod proto_duration {
    use super::*;

    pub fn format(d: &Duration) -> String {
        let nanos = d.subsec_nanos();
        if nanos == 0 {
            return format!("{}s", d.as_secs());
        }
        let frac = format!("{:09}", nanos);
        // protobuf emits 3, 6 or 9 fractional digits
        let frac = if frac.ends_with("000000") {
            &frac[..3]
        } else if frac.ends_with("000") {
            &frac[..6]
        } else {
            &frac[..]
        };
        format!("{}.{}s", d.as_secs(), frac)
    }

    pub fn parse(s: &str) -> Option<Duration> {
        let body = s.strip_suffix('s')?;
        let (secs, frac) = match body.split_once('.') {
            Some((secs, frac)) => (secs, frac),
            None => (body, ""),
        };
        let secs: u64 = secs.parse().ok()?;
        if frac.len() > 9 || !frac.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let nanos = if frac.is_empty() {
            0
        } else {
            format!("{:0<9}", frac).parse().ok()?
        };
        Some(Duration::new(secs, nanos))
    }

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid duration: {}", s)))
    }
}
