//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.
//! Every section has defaults so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Root configuration for the control plane.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ControlPlaneConfig {
    /// Discovery and admin HTTP server.
    pub server: ServerConfig,

    /// Registry watch source.
    pub registry: RegistryConfig,

    /// Consumer identity the bundle is published under.
    pub envoy: EnvoyConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:4000").
    pub address: String,

    /// Timeout for plain fetches and admin requests.
    pub request_timeout_secs: u64,

    /// Upper bound on a `?wait=true` discovery request.
    pub long_poll_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:4000".to_string(),
            request_timeout_secs: 30,
            long_poll_timeout_secs: 30,
        }
    }
}

/// Registry watch configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Namespace scope; empty watches every namespace.
    pub namespace: String,

    /// Registry manifest file.
    pub path: String,

    /// Relist period and scheduler tick.
    pub resync_secs: u64,

    /// How long to wait for the first sync before failing startup.
    pub sync_timeout_secs: u64,

    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            path: "registry.toml".to_string(),
            resync_secs: 30,
            sync_timeout_secs: 60,
            retry_base_delay_ms: 100,
            retry_max_delay_ms: 5000,
        }
    }
}

/// Data-plane identity.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct EnvoyConfig {
    /// Node id the scheduler publishes under.
    pub node: String,
}

impl Default for EnvoyConfig {
    fn default() -> Self {
        Self {
            node: "default".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log encoding ("text" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
