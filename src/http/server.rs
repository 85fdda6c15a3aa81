//! Discovery HTTP server.
//!
//! # Responsibilities
//! - Create the Axum router with discovery and admin handlers
//! - Serve point-in-time fetches and `?wait=true` long polls from the snapshot store
//! - Report stream and fetch lifecycle to the configured callbacks
//! - Stop accepting and release long polls when the root shutdown fires

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::admin;
use crate::cache::{DiscoveryRequest, LoggingCallbacks, SnapshotStore, StoreError, StreamCallbacks};
use crate::config::ServerConfig;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::resources::ResourceKind;
use crate::scheduler::SchedulerState;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SnapshotStore>,
    pub callbacks: Arc<dyn StreamCallbacks>,
    pub long_poll_timeout: Duration,
    /// Node the local scheduler publishes under.
    pub node: String,
    pub scheduler: Option<watch::Receiver<SchedulerState>>,
    pub shutdown: Option<ShutdownSignal>,
    streams: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(store: Arc<SnapshotStore>, node: impl Into<String>) -> Self {
        Self {
            store,
            callbacks: Arc::new(LoggingCallbacks),
            long_poll_timeout: Duration::from_secs(30),
            node: node.into(),
            scheduler: None,
            shutdown: None,
            streams: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_callbacks(mut self, callbacks: Arc<dyn StreamCallbacks>) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn with_long_poll_timeout(mut self, timeout: Duration) -> Self {
        self.long_poll_timeout = timeout;
        self
    }

    pub fn with_scheduler(mut self, state: watch::Receiver<SchedulerState>) -> Self {
        self.scheduler = Some(state);
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn scheduler_state(&self) -> Option<SchedulerState> {
        self.scheduler.as_ref().map(|rx| *rx.borrow())
    }

    fn next_stream_id(&self) -> u64 {
        self.streams.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct DiscoveryQuery {
    /// Hold the request until the version moves past `version_info`.
    pub wait: bool,
}

/// HTTP server for discovery and admin traffic.
pub struct DiscoveryServer {
    router: Router,
}

impl DiscoveryServer {
    pub fn new(config: &ServerConfig, state: AppState) -> Self {
        let router = build_router(state, Duration::from_secs(config.request_timeout_secs));
        Self { router }
    }

    /// Bind `config.address` and return the listener.
    pub async fn bind(config: &ServerConfig) -> Result<TcpListener, ServerError> {
        TcpListener::bind(&config.address)
            .await
            .map_err(|source| ServerError::Bind {
                address: config.address.clone(),
                source,
            })
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(self, listener: TcpListener, mut shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Discovery server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { shutdown.recv().await })
            .await?;

        tracing::info!("Discovery server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    let mut discovery: Router<AppState> = Router::new();
    for kind in ResourceKind::ALL {
        discovery = discovery.route(
            &format!("/v2/discovery:{}", kind),
            post(
                move |State(state): State<AppState>,
                      Query(query): Query<DiscoveryQuery>,
                      Json(request): Json<DiscoveryRequest>| {
                    discover(kind, state, query, request)
                },
            ),
        );
    }

    // Long polls carry their own bound; the request timeout covers the rest.
    let admin = admin::router().layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, request_timeout));

    discovery
        .merge(admin)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

fn status_of(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        StoreError::UpToDate { .. } => (StatusCode::NOT_MODIFIED, "not_modified"),
        StoreError::UnknownTypeUrl(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "error"),
    }
}

fn error_response(kind: ResourceKind, err: StoreError) -> Response {
    let (status, outcome) = status_of(&err);
    metrics::record_fetch(kind.as_str(), outcome);
    if status == StatusCode::NOT_MODIFIED {
        return status.into_response();
    }
    tracing::debug!(kind = %kind, error = %err, "Discovery request failed");
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

async fn discover(kind: ResourceKind, state: AppState, query: DiscoveryQuery, mut request: DiscoveryRequest) -> Response {
    if request.type_url.is_empty() {
        request.type_url = kind.type_url().to_string();
    } else if request.type_url != kind.type_url() {
        return error_response(kind, StoreError::UnknownTypeUrl(request.type_url));
    }

    if query.wait {
        long_poll(kind, state, request).await
    } else {
        fetch(kind, state, request)
    }
}

fn fetch(kind: ResourceKind, state: AppState, request: DiscoveryRequest) -> Response {
    state.callbacks.on_fetch_request(&request);
    match state.store.fetch(&request) {
        Ok(response) => {
            state.callbacks.on_fetch_response(&request, &response);
            metrics::record_fetch(kind.as_str(), "ok");
            Json(response).into_response()
        }
        Err(e) => error_response(kind, e),
    }
}

async fn long_poll(kind: ResourceKind, state: AppState, request: DiscoveryRequest) -> Response {
    let stream_id = state.next_stream_id();
    state.callbacks.on_stream_open(stream_id, &request.type_url);
    state.callbacks.on_stream_request(stream_id, &request);

    let mut watch = match state.store.watch(&request) {
        Ok(watch) => watch,
        Err(e) => {
            state.callbacks.on_stream_closed(stream_id);
            return error_response(kind, e);
        }
    };

    let mut shutdown = state.shutdown.clone();
    let cancelled = async move {
        match shutdown.as_mut() {
            Some(signal) => signal.recv().await,
            None => std::future::pending().await,
        }
    };

    let next = tokio::select! {
        res = tokio::time::timeout(state.long_poll_timeout, watch.next()) => res.ok().flatten(),
        _ = cancelled => None,
    };

    let response = match next {
        Some(response) => {
            state.callbacks.on_stream_response(stream_id, &request, &response);
            metrics::record_fetch(kind.as_str(), "ok");
            Json(response).into_response()
        }
        None => {
            metrics::record_fetch(kind.as_str(), "not_modified");
            StatusCode::NOT_MODIFIED.into_response()
        }
    };

    state.callbacks.on_stream_closed(stream_id);
    response
}
