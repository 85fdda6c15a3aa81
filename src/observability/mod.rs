//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! registry / builder / scheduler / discovery server
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges behind the `metrics` facade)
//!
//! Consumers:
//!     → stdout (text or JSON lines)
//!     → Prometheus scrape endpoint (optional)
//! ```
//!
//! # Design Decisions
//! - Metric calls are no-ops until a recorder is installed
//! - Log verbosity comes from RUST_LOG first, then configuration

pub mod logging;
pub mod metrics;

pub use logging::init_logging;
