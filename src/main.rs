//! kds control plane.
//!
//! # Architecture Overview
//!
//! ```text
//!   registry manifest ──▶ ┌──────────────┐   snapshot   ┌─────────┐
//!   (file / watch)        │ watch source │ ───────────▶ │ builder │
//!                         └──────┬───────┘              └────┬────┘
//!                                │ synced, version            │ bundle
//!                                ▼                            ▼
//!                         ┌──────────────┐   update    ┌───────────────┐
//!                         │  reconciler  │ ──────────▶ │ snapshot store│
//!                         │ (timer tick) │             └───────┬───────┘
//!                         └──────────────┘                     │ fetch / watch
//!                                                              ▼
//!                                                    ┌──────────────────┐
//!                        proxy nodes ◀────────────── │ discovery server │
//!                                                    └──────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use kds::config::load_or_default;
use kds::lifecycle::{self, signals, Shutdown};
use kds::observability::init_logging;

#[derive(Parser)]
#[command(name = "kds", version, about = "Registry-driven proxy control plane")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "KDS_CONFIG", default_value = "kds.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_or_default(&args.config)?;

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "kds starting");
    tracing::info!(
        address = %config.server.address,
        registry = %config.registry.path,
        node = %config.envoy.node,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    lifecycle::run(config, shutdown).await?;
    Ok(())
}
