use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::cache::SnapshotEntry;
use crate::http::server::AppState;
use crate::resources::ResourceBundle;
use crate::scheduler::SchedulerState;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub node: String,
    pub scheduler: Option<SchedulerState>,
    /// Version published for `node`, if any.
    pub snapshot_version: Option<String>,
    pub nodes: usize,
}

/// One line of `/admin/snapshots`.
#[derive(Debug, Serialize)]
pub struct SnapshotSummary {
    pub node: String,
    pub version: String,
    pub published_at: u64,
    pub endpoints: usize,
    pub clusters: usize,
    pub routes: usize,
    pub listeners: usize,
}

impl SnapshotSummary {
    fn new(node: String, entry: &SnapshotEntry) -> Self {
        let [(_, endpoints), (_, clusters), (_, routes), (_, listeners)] = entry.bundle.counts();
        Self {
            node,
            version: entry.version.to_string(),
            published_at: entry.published_at_unix(),
            endpoints,
            clusters,
            routes,
            listeners,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SnapshotDetail<'a> {
    pub node: String,
    pub version: String,
    pub published_at: u64,
    pub bundle: &'a ResourceBundle,
}

pub async fn get_health(State(state): State<AppState>) -> Response {
    let ready = state.store.get(&state.node).is_some();
    if ready {
        (StatusCode::OK, "ok").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "no snapshot published").into_response()
    }
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        node: state.node.clone(),
        scheduler: state.scheduler_state(),
        snapshot_version: state.store.get(&state.node).map(|e| e.version.to_string()),
        nodes: state.store.nodes().len(),
    })
}

pub async fn get_snapshots(State(state): State<AppState>) -> Json<Vec<SnapshotSummary>> {
    let summaries = state
        .store
        .nodes()
        .into_iter()
        .filter_map(|node| {
            let entry = state.store.get(&node)?;
            Some(SnapshotSummary::new(node, &entry))
        })
        .collect();
    Json(summaries)
}

pub async fn get_snapshot(State(state): State<AppState>, Path(node): Path<String>) -> Response {
    match state.store.get(&node) {
        Some(entry) => Json(SnapshotDetail {
            version: entry.version.to_string(),
            published_at: entry.published_at_unix(),
            bundle: &entry.bundle,
            node,
        })
        .into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": format!("no snapshot for node {:?}", node) })),
        )
            .into_response(),
    }
}
