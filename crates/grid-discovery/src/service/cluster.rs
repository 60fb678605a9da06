//! Cluster service: the bounded, distance-ranked neighbor set.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::{Coordinate, DiscoveryConfig, Distance, PeerId, PeerRecord};
use crate::ports::{MembershipApi, ProximityApi, RandomSource, Transport};
use crate::service::tracker::{NeighborTracker, TrackerConfig};
use crate::service::{CoordinateEstimator, LocalNode};

/// What one maintenance pass changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Trackers dropped because they reported `Unreachable`.
    pub removed_unreachable: Vec<PeerId>,
    /// Finite-distance trackers evicted to respect the size bound.
    pub evicted: Vec<PeerId>,
    /// New candidates put on probation.
    pub added: Vec<PeerId>,
    /// Trackers still in probation before new candidates were added.
    pub candidates: usize,
}

struct TrackedNeighbor {
    tracker: Arc<NeighborTracker>,
    _task: JoinHandle<()>,
}

pub struct ClusterService {
    local: Arc<LocalNode>,
    config: DiscoveryConfig,
    estimator: Arc<CoordinateEstimator>,
    membership: Arc<dyn MembershipApi>,
    transport: Arc<dyn Transport>,
    random: Arc<dyn RandomSource>,
    neighbors: Mutex<HashMap<PeerId, TrackedNeighbor>>,
}

impl ClusterService {
    pub fn new(
        local: Arc<LocalNode>,
        config: DiscoveryConfig,
        estimator: Arc<CoordinateEstimator>,
        membership: Arc<dyn MembershipApi>,
        transport: Arc<dyn Transport>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        Self {
            local,
            config,
            estimator,
            membership,
            transport,
            random,
            neighbors: Mutex::new(HashMap::new()),
        }
    }

    /// One maintenance pass.
    ///
    /// Afterwards the set holds at most `max_cluster_size` finite-distance
    /// neighbors plus the candidates still in probation. Must run inside a
    /// tokio runtime: new candidates get their own tracker task.
    ///
    /// Every tracker is asked to ping at the start of the pass, but the pass
    /// does not wait for those pings. Ranking uses the samples gathered so
    /// far and the requested pings show up in the next pass.
    pub fn maintain(&self) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();
        let mut neighbors = self.neighbors.lock();

        for tracked in neighbors.values() {
            tracked.tracker.request_ping();
        }

        let mut ranked: Vec<(PeerId, Distance)> = neighbors
            .iter()
            .map(|(id, tracked)| (*id, tracked.tracker.distance()))
            .collect();
        ranked.sort_by(|a, b| a.1.cmp(&b.1));

        while let Some((id, distance)) = ranked.last().copied() {
            if !distance.is_unreachable() {
                break;
            }
            ranked.pop();
            if let Some(tracked) = neighbors.remove(&id) {
                tracked.tracker.end();
            }
            report.removed_unreachable.push(id);
        }

        let candidates = ranked.iter().filter(|(_, d)| d.is_unknown()).count();
        report.candidates = candidates;

        while ranked.len() - candidates > self.config.max_cluster_size {
            let Some((id, _)) = ranked.pop() else { break };
            if let Some(tracked) = neighbors.remove(&id) {
                tracked.tracker.end();
            }
            report.evicted.push(id);
        }

        let wanted = self.config.candidate_target.saturating_sub(candidates);
        if wanted > 0 {
            let origin = self.estimator.coordinate();
            let local_id = self.local.id();
            let mut pool: Vec<PeerRecord> = self
                .membership
                .get_nodes()
                .into_iter()
                .filter(|r| r.id != local_id && !neighbors.contains_key(&r.id))
                .collect();
            pool.sort_by(|a, b| {
                estimated_distance(&origin, a).total_cmp(&estimated_distance(&origin, b))
            });

            for record in pool.into_iter().take(wanted) {
                let id = record.id;
                let (tracker, task) = NeighborTracker::spawn(
                    record,
                    TrackerConfig::from(&self.config),
                    Arc::clone(&self.estimator),
                    Arc::clone(&self.transport),
                    Arc::clone(&self.random),
                );
                neighbors.insert(id, TrackedNeighbor { tracker, _task: task });
                report.added.push(id);
            }
        }

        debug!(
            neighbors = neighbors.len(),
            candidates,
            removed = report.removed_unreachable.len(),
            evicted = report.evicted.len(),
            added = report.added.len(),
            "Cluster maintenance pass"
        );
        report
    }

    /// Tracker for `id`, if tracked.
    pub fn tracker(&self, id: &PeerId) -> Option<Arc<NeighborTracker>> {
        self.neighbors.lock().get(id).map(|t| Arc::clone(&t.tracker))
    }

    /// Start tracking `record` directly, bypassing candidate selection.
    pub fn track(&self, record: PeerRecord) -> Arc<NeighborTracker> {
        let mut neighbors = self.neighbors.lock();
        if let Some(existing) = neighbors.get(&record.id) {
            return Arc::clone(&existing.tracker);
        }
        let id = record.id;
        let (tracker, task) = NeighborTracker::spawn(
            record,
            TrackerConfig::from(&self.config),
            Arc::clone(&self.estimator),
            Arc::clone(&self.transport),
            Arc::clone(&self.random),
        );
        neighbors.insert(
            id,
            TrackedNeighbor {
                tracker: Arc::clone(&tracker),
                _task: task,
            },
        );
        tracker
    }

    /// End every tracker and forget them.
    pub fn shutdown(&self) {
        for (_, tracked) in self.neighbors.lock().drain() {
            tracked.tracker.end();
        }
    }

    /// Maintenance loop on a jittered interval.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let delay = self.random.jittered(self.config.cluster_interval());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
            self.maintain();
        }
        self.shutdown();
        info!("Cluster maintenance stopped");
    }

    fn trackers(&self) -> Vec<Arc<NeighborTracker>> {
        self.neighbors
            .lock()
            .values()
            .map(|t| Arc::clone(&t.tracker))
            .collect()
    }
}

/// Predicted RTT to `record`; peers without a published coordinate rank last.
fn estimated_distance(origin: &Coordinate, record: &PeerRecord) -> f64 {
    record
        .coordinate
        .map(|c| origin.distance(&c))
        .filter(|d| d.is_finite())
        .unwrap_or(f64::INFINITY)
}

impl ProximityApi for ClusterService {
    fn sorted_neighbors(&self) -> Vec<(PeerRecord, Distance)> {
        let mut ranked: Vec<_> = self
            .trackers()
            .into_iter()
            .map(|t| (t.record(), t.distance()))
            .collect();
        ranked.sort_by(|a, b| a.1.cmp(&b.1));
        ranked
    }

    fn neighbors(&self) -> Vec<PeerRecord> {
        self.trackers().into_iter().map(|t| t.record()).collect()
    }

    fn random_neighbor(&self) -> Option<PeerRecord> {
        let trackers = self.trackers();
        if trackers.is_empty() {
            return None;
        }
        Some(trackers[self.random.random_usize(trackers.len())].record())
    }

    fn neighbor_count(&self) -> usize {
        self.neighbors.lock().len()
    }

    fn nearest_distance(&self) -> Distance {
        self.trackers()
            .into_iter()
            .map(|t| t.distance())
            .filter(Distance::is_finite)
            .min()
            .unwrap_or(Distance::Unreachable)
    }

    fn local_coordinate(&self) -> Coordinate {
        self.estimator.coordinate()
    }
}
