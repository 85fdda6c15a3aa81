//! Discovery and admin HTTP surface.
//!
//! # Data Flow
//! ```text
//! POST /v2/discovery:{kind}[?wait=true]
//!     → server.rs (type URL check, fetch or long poll)
//!     → SnapshotStore (fetch / watch)
//!     → JSON DiscoveryResponse, 304 when nothing newer exists
//!
//! GET /admin/*, /healthz
//!     → admin handlers (read-only views of the store and scheduler)
//! ```

pub mod server;

pub use server::{build_router, AppState, DiscoveryServer, ServerError};
