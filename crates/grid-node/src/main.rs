//! # Compute Grid Node
//!
//! Runs one discovery node: gossip membership, Vivaldi coordinates and the
//! nearest-neighbor cluster.
//!
//! ```text
//! grid-node [config.toml]
//! ```
//!
//! Without a config file the node listens on `0.0.0.0:7946` with default
//! settings and no bootstrap nodes. Logging is configured from the
//! environment (`GRID_LOG_LEVEL`, `GRID_JSON_LOGS`).

use anyhow::{Context, Result};
use tracing::info;

use grid_node::{NodeConfig, NodeRuntime};
use grid_telemetry::{init_telemetry, TelemetryConfig};

/// Load configuration from the path given on the command line, if any.
fn load_config() -> Result<NodeConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            NodeConfig::load(&path).with_context(|| format!("Failed to load config from {path}"))
        }
        None => Ok(NodeConfig::default()),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = init_telemetry(TelemetryConfig::from_env())
        .context("Failed to initialize telemetry")?;

    let config = load_config()?;
    let runtime = NodeRuntime::start(config).await?;

    println!("{}", runtime.local_id());
    info!(
        peer_id = %runtime.local_id(),
        addr = %runtime.local_addr(),
        "Node is running. Press Ctrl+C to stop."
    );
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    runtime.shutdown().await;
    Ok(())
}
