//! # Grid Telemetry
//!
//! Logging and metrics bootstrap for compute grid nodes.
//!
//! ## Components
//!
//! - **Logs:** `tracing-subscriber` with an `EnvFilter` and a pretty or
//!   JSON `fmt` layer
//! - **Metrics:** a Prometheus registry with gossip, cluster and Vivaldi
//!   gauges, rendered by [`gather_metrics`]
//!
//! ## Usage
//!
//! ```rust,ignore
//! use grid_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() {
//!     let _guard = init_telemetry(TelemetryConfig::from_env()).expect("Failed to init telemetry");
//!     // Logs and metrics are now being collected
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GRID_SERVICE_NAME` | `grid-node` | Service name in the startup log |
//! | `GRID_LOG_LEVEL` | `info` | Log level filter (`RUST_LOG` also honored) |
//! | `GRID_CONSOLE_OUTPUT` | `true` | Write logs to stdout |
//! | `GRID_JSON_LOGS` | `false` (`true` in containers) | JSON log lines |

mod config;
mod logging;
pub mod metrics;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use metrics::{
    advance_counter, gather_metrics, register_metrics, MetricsHandle, CLUSTER_NEAREST_DISTANCE,
    CLUSTER_NEIGHBORS, GOSSIP_CACHE_SIZE, GOSSIP_EXCHANGES, GOSSIP_FAILURES, GOSSIP_NETWORK_SIZE,
    VIVALDI_COORDINATE_NORM, VIVALDI_ERROR,
};
pub use tracing_setup::init_tracing;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    // Metrics first, so early loops can record into them
    let metrics = register_metrics()?;
    tracing_setup::init_tracing(&config)?;

    Ok(TelemetryGuard {
        service_name: config.service_name,
        _metrics: metrics,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
    _metrics: MetricsHandle,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}
