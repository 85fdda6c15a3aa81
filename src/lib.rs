//! Control plane that turns registry service and endpoint records into a
//! versioned, referentially consistent proxy configuration bundle.

// Registry and resource model
pub mod node;
pub mod registry;
pub mod resources;

// Core
pub mod builder;
pub mod cache;
pub mod scheduler;

// Serving
pub mod admin;
pub mod http;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use builder::{build, BuildError};
pub use cache::{SnapshotSink, SnapshotStore, StoreError};
pub use config::ControlPlaneConfig;
pub use lifecycle::Shutdown;
pub use resources::ResourceBundle;
pub use scheduler::{Reconciler, SchedulerOptions, SchedulerState};
