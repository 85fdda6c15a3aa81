//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → logging/metrics → bind server → start reconciler
//!
//! Shutdown (shutdown.rs):
//!     Signal received → reconciler drains → server stops accepting → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger the root shutdown
//! ```
//!
//! # Design Decisions
//! - One root signal; every task subscribes to it
//! - The server is listening before the first sync so that nodes can
//!   connect and wait on an empty store
//! - A fatal reconciler error shuts the whole process down

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::{Shutdown, ShutdownSignal};
pub use startup::{run, StartupError};
