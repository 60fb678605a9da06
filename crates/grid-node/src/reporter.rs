//! Stats reporter: copies gossip, cluster and coordinate snapshots into the
//! Prometheus metrics and logs a one-line summary.

use std::sync::Arc;
use std::time::Duration;

use grid_discovery::{CoordinateEstimator, Distance, MembershipApi, ProximityApi};
use grid_telemetry::{
    advance_counter, log_peer_event, CLUSTER_NEAREST_DISTANCE, CLUSTER_NEIGHBORS,
    GOSSIP_CACHE_SIZE, GOSSIP_EXCHANGES, GOSSIP_FAILURES, GOSSIP_NETWORK_SIZE,
    VIVALDI_COORDINATE_NORM, VIVALDI_ERROR,
};
use tokio::sync::watch;
use tracing::debug;

use crate::container::DiscoveryServices;

/// Write one snapshot into the metrics.
pub fn record_metrics(
    membership: &dyn MembershipApi,
    proximity: &dyn ProximityApi,
    estimator: &CoordinateEstimator,
) {
    for stats in membership.get_stats() {
        let label = stats.algorithm.as_str();
        advance_counter(&GOSSIP_EXCHANGES, label, stats.exchanges);
        advance_counter(&GOSSIP_FAILURES, label, stats.failures);
        GOSSIP_CACHE_SIZE
            .with_label_values(&[label])
            .set(stats.cache_size as i64);
        GOSSIP_NETWORK_SIZE
            .with_label_values(&[label])
            .set(stats.network_size_estimate as i64);
    }

    CLUSTER_NEIGHBORS.set(proximity.neighbor_count() as i64);
    CLUSTER_NEAREST_DISTANCE.set(match proximity.nearest_distance() {
        Distance::Millis(ms) => ms,
        _ => f64::INFINITY,
    });

    VIVALDI_COORDINATE_NORM.set(estimator.coordinate().norm());
    VIVALDI_ERROR.set(estimator.error());
}

/// Report every `interval` until `shutdown` fires.
pub async fn run_reporter(
    services: Arc<DiscoveryServices>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let membership = services.membership();
    let proximity = services.proximity();
    loop {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }

        record_metrics(membership.as_ref(), proximity.as_ref(), &services.estimator);
        log_peer_event!(
            info,
            "reporter",
            "Node status",
            services.local_id(),
            known_peers = membership.get_nodes().len(),
            neighbors = proximity.neighbor_count(),
            nearest = %proximity.nearest_distance(),
            coordinate_error = services.estimator.error()
        );
    }
    debug!("Stats reporter stopped");
}
