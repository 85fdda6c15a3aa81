//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;

use crate::config::schema::ControlPlaneConfig;
use crate::config::validation::{validate_config, ValidationError};

pub const ENV_NODE: &str = "KDS_NODE";
pub const ENV_SERVER_ADDRESS: &str = "KDS_SERVER_ADDRESS";
pub const ENV_NAMESPACE: &str = "KDS_NAMESPACE";
pub const ENV_LOG_LEVEL: &str = "KDS_LOG_LEVEL";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Parse(e) => Some(e),
            ConfigError::Validation(_) => None,
        }
    }
}

/// Parse, override from the environment, and validate.
pub fn parse_config(content: &str) -> Result<ControlPlaneConfig, ConfigError> {
    let mut config: ControlPlaneConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ControlPlaneConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content)
}

/// Like [`load_config`], but a missing file yields the defaults.
pub fn load_or_default(path: &Path) -> Result<ControlPlaneConfig, ConfigError> {
    match fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            parse_config("")
        }
        Err(e) => Err(ConfigError::Io(e)),
    }
}

/// Overlay `KDS_*` variables; `lookup` abstracts the environment for tests.
pub fn apply_env_overrides<F>(config: &mut ControlPlaneConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(node) = lookup(ENV_NODE) {
        config.envoy.node = node;
    }
    if let Some(address) = lookup(ENV_SERVER_ADDRESS) {
        config.server.address = address;
    }
    if let Some(namespace) = lookup(ENV_NAMESPACE) {
        config.registry.namespace = namespace;
    }
    if let Some(level) = lookup(ENV_LOG_LEVEL) {
        config.observability.log_level = level;
    }
}
