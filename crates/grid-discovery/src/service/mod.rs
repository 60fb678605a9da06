//! Service Layer
//!
//! Long-running services built on the domain and ports:
//!
//! - [`GossipService`]: one [`GossipEngine`] per gossip variant
//! - [`CoordinateEstimator`]: Vivaldi pings and echo responder
//! - [`NeighborTracker`]: one task per tracked neighbor
//! - [`ClusterService`]: the bounded, distance-ranked neighbor set
//! - [`NodeInfoService`]: answers "who are you" requests
//! - [`ConnectionDispatcher`]: routes accepted streams by service tag

pub mod cluster;
pub mod dispatch;
pub mod gossip;
pub mod local;
pub mod node_info;
pub mod tracker;
pub mod vivaldi;

pub use cluster::{ClusterService, MaintenanceReport};
pub use dispatch::ConnectionDispatcher;
pub use gossip::{EngineContext, GossipEngine, GossipService, RoundOutcome};
pub use local::LocalNode;
pub use node_info::{request_node_info, NodeInfoService};
pub use tracker::{NeighborTracker, TrackerConfig};
pub use vivaldi::{CoordinateEstimator, PingSample};

#[cfg(test)]
mod tests;
