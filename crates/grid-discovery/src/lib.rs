//! # Grid Discovery
//!
//! Peer discovery and proximity for a decentralized compute grid. Every
//! node runs, with no central directory:
//!
//! - **Gossip membership:** epidemic exchange rounds (ARRG and Cyclon
//!   variants) that keep a bounded, randomly churning sample of the
//!   population in each node's peer cache.
//! - **Vivaldi coordinates:** a latency embedding refined by echo pings,
//!   so any two nodes can estimate their RTT without probing.
//! - **Nearest-neighbor cluster:** a bounded, distance-ranked neighbor set
//!   fed by gossip, ranked by coordinates and re-validated by one tracker
//!   task per neighbor.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture with:
//! - **Domain Layer:** peer cache, coordinates, sample windows, config
//! - **Ports Layer:** transport, clock, randomness, bootstrap; membership
//!   and proximity views
//! - **Service Layer:** gossip engines, coordinate estimator, neighbor
//!   trackers, cluster maintenance, node-info responder, dispatcher
//! - **Adapters Layer:** TCP transport, TOML config, system clock, RNG
//!
//! ## Features
//!
//! - `network` (default) - TCP transport and TOML config loading
//! - `test-utils` - in-memory network, controllable clock, `TestNode`
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use grid_discovery::{
//!     CacheEntry, EvictionPolicy, PeerCache, PeerId, PeerRecord, PROTOCOL_VERSION,
//! };
//! use grid_discovery::adapters::{SystemTimeSource, ThreadRandomSource};
//! use grid_discovery::ports::TimeSource;
//!
//! let local = PeerId::random();
//! let time = Arc::new(SystemTimeSource::new());
//! let cache = PeerCache::new(
//!     local,
//!     30,
//!     PROTOCOL_VERSION,
//!     EvictionPolicy::Random,
//!     time.clone(),
//!     Arc::new(ThreadRandomSource::new()),
//! );
//!
//! let peer = PeerRecord::new(PeerId::random(), "10.0.0.7:7946".parse().unwrap(), "grid");
//! cache.add(CacheEntry::new(peer, time.now(), 3_600_000));
//! assert_eq!(cache.len(), 1);
//! ```

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;
pub mod wire;

/// In-memory network, controllable clock and node harness.
/// Requires feature: `test-utils`
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// =============================================================================
// CORE RE-EXPORTS
// =============================================================================

pub use domain::{
    CacheEntry, ConfigError, Coordinate, DiscoveryConfig, DiscoveryError, Distance, DistanceMode,
    EvictionPolicy, GossipAlgorithm, GossipPolicy, GossipStats, PeerCache, PeerId, PeerRecord,
    SampleWindow, TargetSelection, Timestamp, TransportError, VivaldiParams, VivaldiState,
    WireError, DIMENSIONS, PROTOCOL_VERSION,
};

pub use ports::{
    BootstrapSource, ConfigProvider, Connection, MembershipApi, ProximityApi, RandomSource,
    TimeSource, Transport,
};

pub use service::{
    ClusterService, ConnectionDispatcher, CoordinateEstimator, EngineContext, GossipEngine,
    GossipService, LocalNode, MaintenanceReport, NeighborTracker, NodeInfoService, RoundOutcome,
};

pub use wire::{GossipMessage, ServiceTag};
