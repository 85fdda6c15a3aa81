//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize metrics, the snapshot store and the watch source
//! - Bind the discovery server before waiting for the registry
//! - Run the reconciler until shutdown and report the first fatal error

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::cache::SnapshotStore;
use crate::config::ControlPlaneConfig;
use crate::http::{AppState, DiscoveryServer, ServerError};
use crate::lifecycle::Shutdown;
use crate::observability::metrics;
use crate::registry::{FileWatchSource, WatchSource};
use crate::scheduler::{Reconciler, SchedulerError, SchedulerOptions};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Run the control plane from `config` until `shutdown` fires.
pub async fn run(config: ControlPlaneConfig, shutdown: Shutdown) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = DiscoveryServer::bind(&config.server).await?;
    let source: Arc<dyn WatchSource> = Arc::new(FileWatchSource::new(&config.registry));
    serve(config, source, Arc::new(SnapshotStore::new()), listener, shutdown).await
}

/// Wire the reconciler and the discovery server around `source` and `store`.
pub async fn serve(
    config: ControlPlaneConfig,
    source: Arc<dyn WatchSource>,
    store: Arc<SnapshotStore>,
    listener: TcpListener,
    shutdown: Shutdown,
) -> Result<(), StartupError> {
    let reconciler = Reconciler::new(source, store.clone(), SchedulerOptions::from_config(&config));

    let state = AppState::new(store, config.envoy.node.clone())
        .with_long_poll_timeout(Duration::from_secs(config.server.long_poll_timeout_secs))
        .with_scheduler(reconciler.subscribe_state())
        .with_shutdown(shutdown.subscribe());
    let server = DiscoveryServer::new(&config.server, state);
    let server_task = tokio::spawn(server.run(listener, shutdown.subscribe()));

    tracing::info!(
        node = %config.envoy.node,
        namespace = %config.registry.namespace,
        resync_secs = config.registry.resync_secs,
        "Control plane started"
    );

    let scheduled = reconciler.run(shutdown.subscribe()).await;
    if let Err(e) = &scheduled {
        tracing::error!(error = %e, "Reconciler failed, shutting down");
    }
    // The reconciler only returns on shutdown or a fatal error.
    shutdown.trigger();

    let served = server_task.await?;
    scheduled?;
    served?;
    tracing::info!("Shutdown complete");
    Ok(())
}
