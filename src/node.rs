//! Node identity and resource versions.
//!
//! # Responsibilities
//! - Identify the consumer (proxy node) a bundle is published for
//! - Carry the opaque version token that gates republication
//!
//! # Design Decisions
//! - A request without a node maps to the `unknown` consumer
//! - Versions are compared by string equality only, never ordered

use std::fmt;

use serde::{Deserialize, Serialize};

/// Consumer id used when a request carries no node.
pub const UNKNOWN_NODE: &str = "unknown";

/// The data-plane node that issued a discovery request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    /// Logical node name. Bundles are keyed by this value.
    pub id: String,

    /// Proxy cluster the node belongs to (informational).
    pub cluster: String,
}

impl Node {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            cluster: String::new(),
        }
    }
}

/// Maps a node to the consumer key its snapshot is stored under.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeHash;

impl NodeHash {
    /// Return the consumer key for `node`.
    pub fn id(&self, node: Option<&Node>) -> String {
        match node {
            Some(node) => node.id.clone(),
            None => UNKNOWN_NODE.to_string(),
        }
    }
}

/// Opaque version token sourced from the registry's resource-version cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceVersion(String);

impl ResourceVersion {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// An empty version means "nothing observed yet".
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceVersion {
    fn from(v: &str) -> Self {
        Self(v.to_string())
    }
}

impl From<String> for ResourceVersion {
    fn from(v: String) -> Self {
        Self(v)
    }
}

impl PartialEq<str> for ResourceVersion {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ResourceVersion {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
