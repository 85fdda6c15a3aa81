//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (periods > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Pure function: ControlPlaneConfig → Result<(), Vec<ValidationError>>

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::ControlPlaneConfig;
use crate::observability::logging::LOG_FORMATS;

/// A single semantic problem, tagged with the offending key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("invalid socket address {:?}", value)));
    }
}

pub fn validate_config(config: &ControlPlaneConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "server.address", &config.server.address);
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::new("server.request_timeout_secs", "must be greater than 0"));
    }
    if config.server.long_poll_timeout_secs == 0 {
        errors.push(ValidationError::new("server.long_poll_timeout_secs", "must be greater than 0"));
    }

    if config.registry.path.trim().is_empty() {
        errors.push(ValidationError::new("registry.path", "must not be empty"));
    }
    if config.registry.resync_secs == 0 {
        errors.push(ValidationError::new("registry.resync_secs", "must be greater than 0"));
    }
    if config.registry.sync_timeout_secs == 0 {
        errors.push(ValidationError::new("registry.sync_timeout_secs", "must be greater than 0"));
    }
    if config.registry.retry_base_delay_ms > config.registry.retry_max_delay_ms {
        errors.push(ValidationError::new(
            "registry.retry_base_delay_ms",
            "must not exceed registry.retry_max_delay_ms",
        ));
    }

    if config.envoy.node.trim().is_empty() {
        errors.push(ValidationError::new("envoy.node", "must not be empty"));
    }

    if !LOG_FORMATS.contains(&config.observability.log_format.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_format",
            format!("unknown format {:?}, expected one of {:?}", config.observability.log_format, LOG_FORMATS),
        ));
    }
    if config.observability.metrics_enabled {
        check_socket_addr(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
