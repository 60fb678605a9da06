//! Test utilities for grid discovery.
//!
//! Deterministic clock, an in-process network with simulated latency, and
//! a helper that wires a complete node onto it. Enable with the
//! `test-utils` feature flag.
//!
//! # Example
//!
//! ```rust
//! use grid_discovery::test_utils::ControllableTimeSource;
//! use grid_discovery::ports::TimeSource;
//!
//! let time = ControllableTimeSource::new(1_000);
//! time.advance(500);
//! assert_eq!(time.now().as_millis(), 1_500);
//! ```

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::time::Sleep;
use tracing::trace;

use crate::domain::{DiscoveryConfig, PeerId, PeerRecord, TransportError};
use crate::ports::{Connection, MembershipApi, RandomSource, TimeSource, Transport};
use crate::service::{
    ClusterService, ConnectionDispatcher, CoordinateEstimator, EngineContext, GossipService,
    LocalNode, NodeInfoService,
};
use crate::wire::ServiceTag;

/// Buffer size of each in-memory stream direction.
const DUPLEX_BUFFER: usize = 64 * 1024;

/// Cluster name used by [`TestNode`].
pub const TEST_CLUSTER: &str = "test";

pub fn make_peer_id(n: u128) -> PeerId {
    PeerId::from_u128(n)
}

/// Distinct address per node number.
pub fn make_address(n: u128) -> SocketAddr {
    let n = n as u32;
    SocketAddr::from(([10, (n >> 16) as u8, (n >> 8) as u8, n as u8], 7946))
}

pub fn make_record(n: u128) -> PeerRecord {
    PeerRecord::new(make_peer_id(n), make_address(n), TEST_CLUSTER)
}

// ============================================================================
// ControllableTimeSource
// ============================================================================

/// Wall clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ControllableTimeSource {
    millis: AtomicU64,
}

impl ControllableTimeSource {
    pub fn new(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
        }
    }

    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl TimeSource for ControllableTimeSource {
    fn now(&self) -> crate::domain::Timestamp {
        crate::domain::Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

// ============================================================================
// DelayedStream
// ============================================================================

/// Stream wrapper that holds back every read by `latency`.
///
/// The delay starts when a read is issued, so a write followed by a read
/// observes a round trip of `latency`.
pub struct DelayedStream<S> {
    inner: S,
    latency: Duration,
    pending: Option<Pin<Box<Sleep>>>,
}

impl<S> DelayedStream<S> {
    pub fn new(inner: S, latency: Duration) -> Self {
        Self {
            inner,
            latency,
            pending: None,
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for DelayedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let latency = this.latency;
        let sleep = this
            .pending
            .get_or_insert_with(|| Box::pin(tokio::time::sleep(latency)));
        ready!(sleep.as_mut().poll(cx));

        let result = ready!(Pin::new(&mut this.inner).poll_read(cx, buf));
        this.pending = None;
        Poll::Ready(result)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for DelayedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.get_mut().inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

// ============================================================================
// MemoryNetwork / MemoryTransport
// ============================================================================

#[derive(Default)]
struct NetworkState {
    nodes: HashMap<SocketAddr, Arc<ConnectionDispatcher>>,
    latency: HashMap<SocketAddr, Duration>,
    down: HashSet<SocketAddr>,
}

/// In-process registry of nodes keyed by address.
#[derive(Default)]
pub struct MemoryNetwork {
    state: RwLock<NetworkState>,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, addr: SocketAddr, dispatcher: Arc<ConnectionDispatcher>) {
        self.state.write().nodes.insert(addr, dispatcher);
    }

    /// Round-trip latency seen by anyone connecting to `addr`.
    pub fn set_latency(&self, addr: SocketAddr, latency: Duration) {
        self.state.write().latency.insert(addr, latency);
    }

    /// Refuse connections to `addr` while `down` is set.
    pub fn set_down(&self, addr: SocketAddr, down: bool) {
        let mut state = self.state.write();
        if down {
            state.down.insert(addr);
        } else {
            state.down.remove(&addr);
        }
    }

    pub fn transport(self: &Arc<Self>) -> MemoryTransport {
        MemoryTransport {
            network: Arc::clone(self),
        }
    }
}

/// [`Transport`] over a [`MemoryNetwork`].
#[derive(Clone)]
pub struct MemoryTransport {
    network: Arc<MemoryNetwork>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(
        &self,
        addr: SocketAddr,
        tag: ServiceTag,
        _timeout: Duration,
    ) -> Result<Connection, TransportError> {
        let (dispatcher, latency) = {
            let state = self.network.state.read();
            let refused = || TransportError::ConnectFailed {
                addr,
                reason: "connection refused".into(),
            };
            if state.down.contains(&addr) {
                return Err(refused());
            }
            let dispatcher = state.nodes.get(&addr).cloned().ok_or_else(refused)?;
            (dispatcher, state.latency.get(&addr).copied().unwrap_or_default())
        };

        let (client, server) = tokio::io::duplex(DUPLEX_BUFFER);
        tokio::spawn(async move {
            if let Err(e) = dispatcher.dispatch(tag, Box::new(server)).await {
                trace!(%addr, error = %e, "In-memory connection closed with error");
            }
        });

        if latency.is_zero() {
            Ok(Box::new(client))
        } else {
            Ok(Box::new(DelayedStream::new(client, latency)))
        }
    }
}

// ============================================================================
// TestNode
// ============================================================================

/// Every service of one node, wired onto a [`MemoryNetwork`].
pub struct TestNode {
    pub local: Arc<LocalNode>,
    pub config: DiscoveryConfig,
    pub gossip: Arc<GossipService>,
    pub estimator: Arc<CoordinateEstimator>,
    pub cluster: Arc<ClusterService>,
    pub time: Arc<ControllableTimeSource>,
}

impl TestNode {
    /// Build node `n` and register it at [`make_address`]`(n)`.
    pub fn start(
        network: &Arc<MemoryNetwork>,
        n: u128,
        config: DiscoveryConfig,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        let local = Arc::new(LocalNode::new(make_record(n)));
        let time = Arc::new(ControllableTimeSource::new(0));
        let transport: Arc<dyn Transport> = Arc::new(network.transport());

        let ctx = EngineContext {
            local: Arc::clone(&local),
            transport: Arc::clone(&transport),
            bootstrap: None,
            time: time.clone(),
            random: Arc::clone(&random),
        };
        let gossip = Arc::new(GossipService::new(config.clone(), ctx));
        let estimator = Arc::new(CoordinateEstimator::new(
            Arc::clone(&local),
            Arc::clone(&transport),
            Arc::clone(&random),
            config.ping_tries,
            config.connect_timeout(),
        ));
        let node_info = Arc::new(NodeInfoService::new(
            Arc::clone(&local),
            config.max_message_bytes,
            config.connect_timeout(),
        ));
        let cluster = Arc::new(ClusterService::new(
            Arc::clone(&local),
            config.clone(),
            Arc::clone(&estimator),
            Arc::clone(&gossip) as Arc<dyn MembershipApi>,
            transport,
            random,
        ));

        network.register(
            make_address(n),
            Arc::new(ConnectionDispatcher::new(
                Arc::clone(&gossip),
                Arc::clone(&estimator),
                node_info,
                config.connect_timeout(),
            )),
        );

        Self {
            local,
            config,
            gossip,
            estimator,
            cluster,
            time,
        }
    }

    pub fn id(&self) -> PeerId {
        self.local.id()
    }

    pub fn record(&self) -> PeerRecord {
        self.local.record()
    }

    pub fn address(&self) -> SocketAddr {
        self.local.record().address
    }
}
