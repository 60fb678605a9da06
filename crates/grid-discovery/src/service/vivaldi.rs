//! Coordinate estimator: owns the local Vivaldi state, measures RTTs with
//! the echo sub-protocol and answers echo requests from other nodes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::domain::{Coordinate, DiscoveryError, VivaldiParams, VivaldiState};
use crate::ports::{Connection, MembershipApi, ProximityApi, RandomSource, Transport};
use crate::service::LocalNode;
use crate::wire::{read_coordinate, write_coordinate, ServiceTag};

/// Result of one successful ping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PingSample {
    /// Minimum RTT over all echo rounds, in milliseconds.
    pub rtt_ms: f64,
    pub remote: Coordinate,
    pub remote_error: f64,
}

pub struct CoordinateEstimator {
    local: Arc<LocalNode>,
    state: Mutex<VivaldiState>,
    params: VivaldiParams,
    transport: Arc<dyn Transport>,
    random: Arc<dyn RandomSource>,
    tries: usize,
    timeout: Duration,
}

impl CoordinateEstimator {
    pub fn new(
        local: Arc<LocalNode>,
        transport: Arc<dyn Transport>,
        random: Arc<dyn RandomSource>,
        tries: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            local,
            state: Mutex::new(VivaldiState::default()),
            params: VivaldiParams::default(),
            transport,
            random,
            tries: tries.clamp(1, u8::MAX as usize + 1),
            timeout,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        self.state.lock().coordinate
    }

    /// Local error estimate in `[0, 1]`.
    pub fn error(&self) -> f64 {
        self.state.lock().error
    }

    /// Predicted RTT from this node to `other`, in milliseconds.
    pub fn distance_to(&self, other: &Coordinate) -> f64 {
        self.coordinate().distance(other)
    }

    /// Measure the RTT to `addr` and, when `update` is set, feed the sample
    /// into the local coordinate.
    ///
    /// The whole ping, connect included, is bounded by the configured
    /// timeout. A mismatched echo fails the ping.
    pub async fn ping(&self, addr: SocketAddr, update: bool) -> Result<PingSample, DiscoveryError> {
        let exchange = async {
            let mut stream = self
                .transport
                .connect(addr, ServiceTag::Vivaldi, self.timeout)
                .await?;
            let (remote, remote_error) = read_coordinate(&mut stream).await?;

            let mut best = f64::INFINITY;
            for trial in 0..self.tries {
                let sent = trial as u8;
                let started = Instant::now();
                stream.write_u8(sent).await?;
                stream.flush().await?;
                let received = stream.read_u8().await?;
                if received != sent {
                    return Err(DiscoveryError::EchoMismatch { sent, received });
                }
                best = best.min(started.elapsed().as_secs_f64() * 1_000.0);
            }

            Ok::<_, DiscoveryError>(PingSample {
                rtt_ms: best,
                remote,
                remote_error,
            })
        };

        let sample = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| DiscoveryError::Timeout("vivaldi ping"))??;

        trace!(%addr, rtt_ms = sample.rtt_ms, "Ping completed");

        if update {
            self.observe(&sample)?;
        }
        Ok(sample)
    }

    /// Apply one sample to the local coordinate and publish the result.
    ///
    /// Returns the predicted distance to the remote after the update.
    pub fn observe(&self, sample: &PingSample) -> Result<f64, DiscoveryError> {
        let mut state = self.state.lock();
        let predicted = state.apply_sample(
            &sample.remote,
            sample.remote_error,
            sample.rtt_ms,
            self.random.random_unit(),
            &self.params,
        )?;
        self.local.publish_coordinate(state.coordinate);
        Ok(predicted)
    }

    /// Responder side: send the local coordinate, then echo each trial byte.
    ///
    /// A requester that hangs up early is not an error. The whole exchange
    /// is bounded by the same timeout as an outbound ping.
    pub async fn handle_connection(&self, mut stream: Connection) -> Result<(), DiscoveryError> {
        let VivaldiState { coordinate, error } = *self.state.lock();
        let echo = async {
            write_coordinate(&mut stream, &coordinate, error).await?;

            for _ in 0..self.tries {
                let byte = match stream.read_u8().await {
                    Ok(byte) => byte,
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                    Err(e) => return Err(e.into()),
                };
                stream.write_u8(byte).await?;
                stream.flush().await?;
            }
            Ok::<_, DiscoveryError>(())
        };
        tokio::time::timeout(self.timeout, echo)
            .await
            .map_err(|_| DiscoveryError::Timeout("vivaldi echo"))?
    }

    /// Refinement loop: each interval ping one tracked neighbor and one
    /// random gossip peer, updating the coordinate from both.
    pub async fn run(
        self: Arc<Self>,
        proximity: Arc<dyn ProximityApi>,
        membership: Arc<dyn MembershipApi>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let delay = self.random.jittered(interval);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }

            let targets = [proximity.random_neighbor(), membership.get_random_node()];
            for peer in targets.into_iter().flatten() {
                if peer.id == self.local.id() {
                    continue;
                }
                match self.ping(peer.address, true).await {
                    Ok(sample) => debug!(
                        peer_id = %peer.id,
                        rtt_ms = sample.rtt_ms,
                        error = self.error(),
                        "Coordinate updated"
                    ),
                    Err(e) => debug!(peer_id = %peer.id, error = %e, "Vivaldi ping failed"),
                }
            }
        }
        debug!("Vivaldi loop stopped");
    }
}
