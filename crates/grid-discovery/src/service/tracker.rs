//! Per-neighbor liveness and latency prober.
//!
//! Each tracker runs as its own task:
//!
//! - **Probation** (`Distance::Unknown`): pings back-to-back until the
//!   sample window is full.
//! - **Active** (finite distance): pings on a jittered interval, or as
//!   soon as the owner asks.
//! - **Unreachable**: more than `max_failures` consecutive failures. One
//!   confirmatory attempt follows; if it fails too, the task exits.
//! - **Ended**: forced by the owner through [`NeighborTracker::end`]; the
//!   distance is `Unreachable` from then on and the task exits.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::domain::{
    DiscoveryConfig, DiscoveryError, Distance, DistanceMode, PeerId, PeerRecord, SampleWindow,
};
use crate::ports::{RandomSource, Transport};
use crate::service::node_info::request_node_info;
use crate::service::CoordinateEstimator;

/// Tracker tunables, lifted from [`DiscoveryConfig`].
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub window: usize,
    pub max_failures: u32,
    pub ping_interval: Duration,
    pub distance_mode: DistanceMode,
    pub timeout: Duration,
    pub max_message_bytes: usize,
}

impl From<&DiscoveryConfig> for TrackerConfig {
    fn from(config: &DiscoveryConfig) -> Self {
        Self {
            window: config.sample_window,
            max_failures: config.max_ping_failures,
            ping_interval: config.neighbor_ping_interval(),
            distance_mode: config.distance_mode,
            timeout: config.connect_timeout(),
            max_message_bytes: config.max_message_bytes,
        }
    }
}

#[derive(Debug)]
struct TrackerState {
    record: PeerRecord,
    window: SampleWindow,
    consecutive_failures: u32,
    ended: bool,
}

pub struct NeighborTracker {
    id: PeerId,
    config: TrackerConfig,
    state: Mutex<TrackerState>,
    ping_now: Notify,
    stop: watch::Sender<bool>,
    estimator: Arc<CoordinateEstimator>,
    transport: Arc<dyn Transport>,
    random: Arc<dyn RandomSource>,
}

impl NeighborTracker {
    /// Create a tracker for `record` and start its task.
    pub fn spawn(
        record: PeerRecord,
        config: TrackerConfig,
        estimator: Arc<CoordinateEstimator>,
        transport: Arc<dyn Transport>,
        random: Arc<dyn RandomSource>,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (stop, stop_rx) = watch::channel(false);
        let tracker = Arc::new(Self {
            id: record.id,
            state: Mutex::new(TrackerState {
                record,
                window: SampleWindow::new(config.window),
                consecutive_failures: 0,
                ended: false,
            }),
            config,
            ping_now: Notify::new(),
            stop,
            estimator,
            transport,
            random,
        });
        let handle = tokio::spawn(Arc::clone(&tracker).run(stop_rx));
        (tracker, handle)
    }

    /// Id the tracker was created for.
    pub fn peer_id(&self) -> PeerId {
        self.id
    }

    /// Latest record, refreshed before every ping.
    pub fn record(&self) -> PeerRecord {
        self.state.lock().record.clone()
    }

    pub fn distance(&self) -> Distance {
        let state = self.state.lock();
        if state.ended || state.consecutive_failures > self.config.max_failures {
            return Distance::Unreachable;
        }
        state.window.distance(self.config.distance_mode)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state.lock().consecutive_failures
    }

    pub fn samples(&self) -> Vec<f64> {
        self.state.lock().window.samples()
    }

    pub fn is_ended(&self) -> bool {
        self.state.lock().ended
    }

    /// Retire the tracker: distance becomes `Unreachable` and the task stops.
    pub fn end(&self) {
        self.state.lock().ended = true;
        self.stop.send_replace(true);
    }

    /// Ask the task to ping now instead of waiting out its interval.
    pub fn request_ping(&self) {
        self.ping_now.notify_one();
    }

    /// Refresh the peer's record, then take one RTT sample.
    ///
    /// Any failure, node-info included, counts toward the failure streak.
    pub async fn ping_once(&self) -> Result<f64, DiscoveryError> {
        let result = self.probe().await;
        let mut state = self.state.lock();
        match &result {
            Ok(rtt_ms) => {
                state.window.push(*rtt_ms);
                state.consecutive_failures = 0;
            }
            Err(_) => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
            }
        }
        result
    }

    async fn probe(&self) -> Result<f64, DiscoveryError> {
        let address = self.state.lock().record.address;
        let fresh = request_node_info(
            self.transport.as_ref(),
            address,
            self.config.timeout,
            self.config.max_message_bytes,
        )
        .await?;

        let address = {
            let mut state = self.state.lock();
            if fresh.id != state.record.id {
                warn!(
                    expected = %state.record.id,
                    actual = %fresh.id,
                    %address,
                    "Neighbor identity changed, following new node"
                );
            }
            state.record = fresh;
            state.record.address
        };

        let sample = self.estimator.ping(address, false).await?;
        Ok(sample.rtt_ms)
    }

    async fn run(self: Arc<Self>, mut stop: watch::Receiver<bool>) {
        loop {
            if *stop.borrow() {
                break;
            }

            let outcome = self.ping_once().await;
            let distance = self.distance();
            match &outcome {
                Ok(rtt_ms) => trace!(peer_id = %self.id, rtt_ms, %distance, "Neighbor ping"),
                Err(e) => debug!(
                    peer_id = %self.id,
                    failures = self.consecutive_failures(),
                    error = %e,
                    "Neighbor ping failed"
                ),
            }

            if distance.is_unreachable() {
                if self.is_ended() || self.ping_once().await.is_err() {
                    break;
                }
                continue;
            }

            // Probation pings back-to-back
            if outcome.is_ok() && distance.is_unknown() {
                continue;
            }

            let delay = self.random.jittered(self.config.ping_interval);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.ping_now.notified() => {}
                _ = stop.changed() => {}
            }
        }
        debug!(peer_id = %self.id, "Neighbor tracker stopped");
    }
}
