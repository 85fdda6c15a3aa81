//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, KDS_* environment overrides)
//!     → validation.rs (semantic checks)
//!     → ControlPlaneConfig (validated, immutable)
//!     → sections handed to the subsystems that own them
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_or_default, ConfigError};
pub use schema::{ControlPlaneConfig, EnvoyConfig, ObservabilityConfig, RegistryConfig, ServerConfig};
