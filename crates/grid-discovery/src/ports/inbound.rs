//! # Driving Ports (Inbound API)
//!
//! Read-side APIs this subsystem exposes to the rest of the node
//! (schedulers, stats reporters) and to its own sibling services.
//! Every method returns an owned snapshot, never a live reference.

use crate::domain::{Coordinate, Distance, GossipStats, PeerRecord};

/// Membership view produced by the gossip layer.
///
/// # Example
///
/// ```rust,ignore
/// fn pick_worker<M: MembershipApi + ?Sized>(membership: &M) -> Option<PeerRecord> {
///     membership.get_random_node()
/// }
/// ```
pub trait MembershipApi: Send + Sync {
    /// Every known peer across all running variants, deduplicated by id
    /// (newest epoch wins).
    fn get_nodes(&self) -> Vec<PeerRecord>;

    /// One uniformly chosen known peer.
    fn get_random_node(&self) -> Option<PeerRecord>;

    /// Up to `n` distinct known peers.
    fn get_random_nodes(&self, n: usize) -> Vec<PeerRecord>;

    /// Peers that answered a gossip exchange recently.
    fn get_fallback_nodes(&self) -> Vec<PeerRecord>;

    /// Per-variant exchange statistics.
    fn get_stats(&self) -> Vec<GossipStats>;
}

/// Proximity view produced by the cluster layer.
pub trait ProximityApi: Send + Sync {
    /// Tracked neighbors with their distances, ascending.
    fn sorted_neighbors(&self) -> Vec<(PeerRecord, Distance)>;

    /// Tracked neighbors in no particular order.
    fn neighbors(&self) -> Vec<PeerRecord>;

    /// One uniformly chosen tracked neighbor.
    fn random_neighbor(&self) -> Option<PeerRecord>;

    fn neighbor_count(&self) -> usize;

    /// Smallest finite distance among tracked neighbors.
    ///
    /// `Distance::Unreachable` when no neighbor has a finite distance yet.
    fn nearest_distance(&self) -> Distance;

    /// This node's current network coordinate.
    fn local_coordinate(&self) -> Coordinate;
}
