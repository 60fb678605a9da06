//! Prometheus metrics for grid nodes.
//!
//! All metrics follow the naming convention: `grid_<subsystem>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., gossip_exchanges_total)
//! - **Gauge**: Value that can go up or down (e.g., cluster_neighbors)

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Gauge, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // GOSSIP METRICS
    // =========================================================================

    /// Completed exchanges per gossip variant
    pub static ref GOSSIP_EXCHANGES: IntCounterVec = IntCounterVec::new(
        Opts::new("grid_gossip_exchanges_total", "Completed gossip exchanges"),
        &["algorithm"]
    ).expect("metric creation failed");

    /// Abandoned rounds per gossip variant
    pub static ref GOSSIP_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("grid_gossip_failures_total", "Gossip rounds abandoned after a failed exchange"),
        &["algorithm"]
    ).expect("metric creation failed");

    /// Entries currently held in each variant's peer cache
    pub static ref GOSSIP_CACHE_SIZE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("grid_gossip_cache_size", "Entries in the gossip peer cache"),
        &["algorithm"]
    ).expect("metric creation failed");

    /// Perceived network size per gossip variant
    pub static ref GOSSIP_NETWORK_SIZE: IntGaugeVec = IntGaugeVec::new(
        Opts::new(
            "grid_gossip_network_size_estimate",
            "Distinct peers observed in recently received gossip payloads"
        ),
        &["algorithm"]
    ).expect("metric creation failed");

    // =========================================================================
    // CLUSTER METRICS
    // =========================================================================

    /// Tracked neighbors, candidates included
    pub static ref CLUSTER_NEIGHBORS: IntGauge = IntGauge::new(
        "grid_cluster_neighbors",
        "Neighbors currently tracked, candidates in probation included"
    ).expect("metric creation failed");

    /// Distance to the nearest measured neighbor (+Inf when none)
    pub static ref CLUSTER_NEAREST_DISTANCE: Gauge = Gauge::new(
        "grid_cluster_nearest_distance_ms",
        "Measured RTT to the nearest neighbor in milliseconds"
    ).expect("metric creation failed");

    // =========================================================================
    // VIVALDI METRICS
    // =========================================================================

    /// Distance of the local coordinate from the origin
    pub static ref VIVALDI_COORDINATE_NORM: Gauge = Gauge::new(
        "grid_vivaldi_coordinate_norm",
        "Euclidean norm of the local Vivaldi coordinate"
    ).expect("metric creation failed");

    /// Local error estimate in [0, 1]
    pub static ref VIVALDI_ERROR: Gauge = Gauge::new(
        "grid_vivaldi_error",
        "Smoothed relative prediction error of the local coordinate"
    ).expect("metric creation failed");
}

/// Proof that the metrics were registered.
#[derive(Debug)]
pub struct MetricsHandle {
    _private: (),
}

/// Register all metrics with the global registry.
///
/// Calling it again is harmless: already-registered metrics are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Gossip
        Box::new(GOSSIP_EXCHANGES.clone()),
        Box::new(GOSSIP_FAILURES.clone()),
        Box::new(GOSSIP_CACHE_SIZE.clone()),
        Box::new(GOSSIP_NETWORK_SIZE.clone()),
        // Cluster
        Box::new(CLUSTER_NEIGHBORS.clone()),
        Box::new(CLUSTER_NEAREST_DISTANCE.clone()),
        // Vivaldi
        Box::new(VIVALDI_COORDINATE_NORM.clone()),
        Box::new(VIVALDI_ERROR.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle { _private: () })
}

/// Raise a counter to an absolute total taken from a snapshot.
///
/// Counters never move backwards; a smaller total is ignored.
pub fn advance_counter(counter: &IntCounterVec, label: &str, total: u64) {
    let counter = counter.with_label_values(&[label]);
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

/// Encode all metrics as Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_twice() {
        assert!(register_metrics().is_ok());
        assert!(register_metrics().is_ok());
    }

    #[test]
    fn test_advance_counter_never_moves_backwards() {
        advance_counter(&GOSSIP_EXCHANGES, "test-advance", 5);
        advance_counter(&GOSSIP_EXCHANGES, "test-advance", 3);
        assert_eq!(GOSSIP_EXCHANGES.with_label_values(&["test-advance"]).get(), 5);

        advance_counter(&GOSSIP_EXCHANGES, "test-advance", 9);
        assert_eq!(GOSSIP_EXCHANGES.with_label_values(&["test-advance"]).get(), 9);
    }

    #[test]
    fn test_gauge_set() {
        CLUSTER_NEIGHBORS.set(4);
        assert_eq!(CLUSTER_NEIGHBORS.get(), 4);
    }

    #[test]
    fn test_gather_renders_registered_metrics() {
        register_metrics().unwrap();
        GOSSIP_CACHE_SIZE.with_label_values(&["cyclon"]).set(7);

        let text = gather_metrics().unwrap();

        assert!(text.contains("grid_gossip_cache_size{algorithm=\"cyclon\"} 7"));
    }
}
