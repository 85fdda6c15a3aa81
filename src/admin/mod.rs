//! Read-only operator API.
//!
//! Mounted on the discovery server; `kds-cli` is its client.

pub mod handlers;

use axum::{routing::get, Router};

use crate::http::server::AppState;
use self::handlers::*;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(get_health))
        .route("/admin/status", get(get_status))
        .route("/admin/snapshots", get(get_snapshots))
        .route("/admin/snapshots/{node}", get(get_snapshot))
}
