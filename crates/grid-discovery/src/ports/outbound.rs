//! # Driven Ports (Outbound SPI)
//!
//! Interfaces this subsystem **requires** from the host: a byte-stream
//! transport, a wall clock, a random source, bootstrap peers and
//! configuration.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::domain::{
    Coordinate, DiscoveryConfig, PeerRecord, Timestamp, TransportError, DIMENSIONS,
};
use crate::wire::ServiceTag;

/// Bidirectional byte stream.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// An established connection to a peer service.
pub type Connection = Box<dyn AsyncStream>;

/// Point-to-point stream transport.
///
/// `connect` must write `tag` as the first byte of the stream so the
/// remote [`ConnectionDispatcher`](crate::service::ConnectionDispatcher)
/// can route it.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; every background loop holds a
/// shared handle.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a stream to `addr` for the service identified by `tag`.
    ///
    /// Fails with [`TransportError::Timeout`] when `timeout` elapses first.
    async fn connect(
        &self,
        addr: SocketAddr,
        tag: ServiceTag,
        timeout: Duration,
    ) -> Result<Connection, TransportError>;
}

/// Wall clock used for cache TTL arithmetic.
///
/// Production uses the system clock; tests use a controllable clock.
pub trait TimeSource: Send + Sync {
    /// Current time in milliseconds since the Unix epoch.
    fn now(&self) -> Timestamp;
}

/// Injected randomness.
///
/// Every sampling decision (cache victims, gossip targets, jitter, Vivaldi
/// tie-breaking) goes through this trait so tests can pin it.
pub trait RandomSource: Send + Sync {
    /// Uniform value in `0..max`; returns 0 when `max == 0`.
    fn random_usize(&self, max: usize) -> usize;

    /// Uniform value in `[0, 1)`.
    fn random_f64(&self) -> f64;

    /// Direction used when two coordinates coincide.
    fn random_unit(&self) -> [f64; DIMENSIONS] {
        let raw = std::array::from_fn(|_| self.random_f64() * 2.0 - 1.0);
        Coordinate::unit(raw).components()
    }

    /// `base` plus a uniform jitter of up to `base`.
    fn jittered(&self, base: Duration) -> Duration {
        base + base.mul_f64(self.random_f64())
    }
}

/// Out-of-band source of peers used to seed an empty gossip cache.
#[async_trait]
pub trait BootstrapSource: Send + Sync {
    /// One bootstrap peer, if any is currently reachable.
    async fn bootstrap_peer(&self) -> Option<PeerRecord>;
}

/// Configuration loading.
pub trait ConfigProvider: Send + Sync {
    /// Addresses of well-known nodes queried for bootstrap records.
    fn get_bootstrap_nodes(&self) -> Vec<SocketAddr>;

    /// Discovery tunables.
    fn get_discovery_config(&self) -> DiscoveryConfig;
}
