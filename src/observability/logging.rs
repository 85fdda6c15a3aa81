//! Structured logging.
//!
//! # Responsibilities
//! - Install the global tracing subscriber
//! - Select human-readable or JSON output

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Output encodings accepted in `observability.log_format`.
pub const LOG_FORMATS: [&str; 2] = ["text", "json"];

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("kds={level},tower_http={level},warn")))
}

/// Initialize the global subscriber.
///
/// Calling this twice (tests, embedding) leaves the first subscriber in place.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = env_filter(&config.log_level);
    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.log_format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if let Err(e) = result {
        tracing::debug!(error = %e, "Logging already initialized");
    }
}
