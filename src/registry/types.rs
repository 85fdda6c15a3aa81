//! Registry record definitions.
//!
//! These mirror the two record kinds the control plane watches. They are
//! plain data: a watch update replaces a record wholesale, nothing mutates one
//! in place.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Routing domain the service is exposed under. Missing means "not exposed".
pub const ANNOTATION_DOMAINS: &str = "domains";

/// Named port selector.
pub const ANNOTATION_PORT: &str = "port";

/// Connect timeout override, as a duration string (`250ms`, `2s`).
pub const ANNOTATION_CONNECT_TIMEOUT: &str = "connect_timeout";

/// Load-balancing policy override (`ROUND_ROBIN`, `LEAST_REQUEST`, ...).
pub const ANNOTATION_LB_POLICY: &str = "lb_policy";

/// Qualified form accepted as a fallback, e.g. `kds.kubenvoy.dev/domains`.
pub const ANNOTATION_PREFIX: &str = "kds.kubenvoy.dev/";

/// A service record with its annotations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ServiceRecord {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            annotations: BTreeMap::new(),
        }
    }

    /// Builder-style helper to attach an annotation.
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Look up `key`, falling back to its [`ANNOTATION_PREFIX`]ed form.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .get(key)
            .or_else(|| self.annotations.get(&format!("{}{}", ANNOTATION_PREFIX, key)))
            .map(String::as_str)
    }

    /// The routing domain, if the service is exposed at all.
    pub fn domain(&self) -> Option<&str> {
        self.annotation(ANNOTATION_DOMAINS).filter(|d| !d.is_empty())
    }
}

/// A backend address inside an endpoint subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointAddress {
    pub ip: String,
}

impl EndpointAddress {
    pub fn new(ip: impl Into<String>) -> Self {
        Self { ip: ip.into() }
    }
}

fn default_protocol() -> String {
    "TCP".to_string()
}

/// A port exposed by every address of a subset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointPort {
    /// Port name. Empty for an unnamed port.
    #[serde(default)]
    pub name: String,

    pub port: u16,

    #[serde(default = "default_protocol")]
    pub protocol: String,
}

impl EndpointPort {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
            protocol: default_protocol(),
        }
    }
}

/// A group of addresses sharing the same set of ports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSubset {
    #[serde(default)]
    pub addresses: Vec<EndpointAddress>,

    #[serde(default)]
    pub ports: Vec<EndpointPort>,
}

/// The endpoints of a service, joined to its [`ServiceRecord`] by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRecord {
    pub name: String,

    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub subsets: Vec<EndpointSubset>,
}

impl EndpointRecord {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            subsets: Vec::new(),
        }
    }

    pub fn with_subset(mut self, subset: EndpointSubset) -> Self {
        self.subsets.push(subset);
        self
    }
}

/// The kind of a registry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Service,
    Endpoints,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Service => "service",
            RecordKind::Endpoints => "endpoints",
        }
    }
}

/// A record as delivered by a watch source.
///
/// The kind is resolved once here; consumers never inspect untyped objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryObject {
    Service(ServiceRecord),
    Endpoints(EndpointRecord),
}

impl RegistryObject {
    pub fn kind(&self) -> RecordKind {
        match self {
            RegistryObject::Service(_) => RecordKind::Service,
            RegistryObject::Endpoints(_) => RecordKind::Endpoints,
        }
    }

    /// Store key, `namespace/name` (or just `name` without a namespace).
    pub fn key(&self) -> String {
        let (namespace, name) = match self {
            RegistryObject::Service(s) => (&s.namespace, &s.name),
            RegistryObject::Endpoints(e) => (&e.namespace, &e.name),
        };
        object_key(namespace, name)
    }

    pub fn namespace(&self) -> &str {
        match self {
            RegistryObject::Service(s) => &s.namespace,
            RegistryObject::Endpoints(e) => &e.namespace,
        }
    }
}

pub(crate) fn object_key(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", namespace, name)
    }
}

/// Point-in-time view of the mirrored registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub services: Vec<ServiceRecord>,
    pub endpoints: Vec<EndpointRecord>,
}
