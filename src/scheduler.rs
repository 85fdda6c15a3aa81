//! Reconciliation scheduler.
//!
//! # State Machine
//! ```text
//! Idle ──start──▶ WaitingForSync ──synced──▶ Ready ──shutdown──▶ Draining
//!                       │                                           ▲
//!                       └──────────────── shutdown ─────────────────┘
//! ```
//!
//! In `Ready`, every tick reads the source's version cursor and asks the
//! sink whether that version is new. Only then is the bundle rebuilt and
//! published. A failed tick keeps the previous bundle and waits for the
//! next tick.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::builder::{build, BuildError};
use crate::cache::{SnapshotSink, StoreError};
use crate::config::ControlPlaneConfig;
use crate::lifecycle::ShutdownSignal;
use crate::node::ResourceVersion;
use crate::observability::metrics;
use crate::registry::{RegistryError, WatchSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    WaitingForSync,
    Ready,
    Draining,
}

impl SchedulerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerState::Idle => "idle",
            SchedulerState::WaitingForSync => "waiting_for_sync",
            SchedulerState::Ready => "ready",
            SchedulerState::Draining => "draining",
        }
    }
}

/// Result of one reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The sink already holds this version; nothing was built.
    Unchanged(ResourceVersion),
    Published(ResourceVersion),
}

/// A failed tick. The previously published bundle stays in place.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    #[error("snapshot rejected: {0}")]
    Store(#[from] StoreError),
}

/// Fatal scheduler errors; all of them happen before the first publication.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("registry did not sync within {0:?}")]
    SyncTimeout(Duration),

    #[error("registry watch stopped before syncing")]
    SourceClosed,
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Node the bundle is published under.
    pub node: String,
    pub resync_period: Duration,
    pub sync_timeout: Duration,
}

impl SchedulerOptions {
    pub fn from_config(config: &ControlPlaneConfig) -> Self {
        Self {
            node: config.envoy.node.clone(),
            resync_period: Duration::from_secs(config.registry.resync_secs),
            sync_timeout: Duration::from_secs(config.registry.sync_timeout_secs),
        }
    }
}

/// Drives builder and store from the watch source and a timer.
pub struct Reconciler {
    source: Arc<dyn WatchSource>,
    sink: Arc<dyn SnapshotSink>,
    options: SchedulerOptions,
    state: watch::Sender<SchedulerState>,
}

impl Reconciler {
    pub fn new(source: Arc<dyn WatchSource>, sink: Arc<dyn SnapshotSink>, options: SchedulerOptions) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            source,
            sink,
            options,
            state,
        }
    }

    pub fn node(&self) -> &str {
        &self.options.node
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: SchedulerState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::info!(from = prev.as_str(), to = next.as_str(), "Scheduler state changed");
        }
    }

    /// One pass: version gate, then build and publish.
    pub fn reconcile(&self) -> Result<ReconcileOutcome, ReconcileError> {
        let node = self.options.node.as_str();
        let version = self.source.current_version();
        if !self.sink.should_update(node, &version) {
            return Ok(ReconcileOutcome::Unchanged(version));
        }

        // the gate read may already be stale; tag with the version the records belong to
        let (version, snapshot) = self.source.versioned_snapshot();
        let bundle = build(&snapshot.services, &snapshot.endpoints, version.clone())?;
        self.sink.update(node, version.clone(), bundle)?;
        Ok(ReconcileOutcome::Published(version))
    }

    /// Reconcile and report; errors never escape a tick.
    pub fn tick(&self) -> Option<ReconcileOutcome> {
        match self.reconcile() {
            Ok(outcome) => {
                match &outcome {
                    ReconcileOutcome::Unchanged(version) => {
                        tracing::debug!(node = %self.options.node, version = %version, "Snapshot up to date");
                        metrics::record_build("unchanged");
                    }
                    ReconcileOutcome::Published(_) => metrics::record_build("published"),
                }
                Some(outcome)
            }
            Err(e) => {
                tracing::error!(node = %self.options.node, error = %e, "Reconcile failed, keeping previous snapshot");
                metrics::record_build("failed");
                None
            }
        }
    }

    /// Wait for the source's first sync. `Ok(false)` if shutdown came first.
    async fn wait_for_sync(&self, shutdown: &mut ShutdownSignal) -> Result<bool, SchedulerError> {
        let mut synced = self.source.subscribe_synced();
        let timeout = self.options.sync_timeout;
        let wait = async move { synced.wait_for(|s| *s).await.map(|_| ()) };

        tokio::select! {
            res = time::timeout(timeout, wait) => match res {
                Ok(Ok(())) => Ok(true),
                Ok(Err(_)) => Err(SchedulerError::SourceClosed),
                Err(_) => Err(SchedulerError::SyncTimeout(timeout)),
            },
            _ = shutdown.recv() => Ok(false),
        }
    }

    /// Run until `shutdown` fires. The last published bundle is left in the sink.
    pub async fn run(self, mut shutdown: ShutdownSignal) -> Result<(), SchedulerError> {
        self.set_state(SchedulerState::WaitingForSync);
        self.source.start(shutdown.clone())?;

        if !self.wait_for_sync(&mut shutdown).await? {
            self.set_state(SchedulerState::Draining);
            return Ok(());
        }

        self.set_state(SchedulerState::Ready);
        self.tick();

        let period = self.options.resync_period;
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Scheduler received shutdown signal, exiting loop");
                    break;
                }
            }
        }

        self.set_state(SchedulerState::Draining);
        Ok(())
    }
}
