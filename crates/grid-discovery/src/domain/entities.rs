//! Core Domain Entities for Grid Discovery
//!
//! - [`PeerId`]: opaque 128-bit node identity
//! - [`PeerRecord`]: what a node advertises about itself
//! - [`CacheEntry`]: a record as held by a gossip cache
//! - [`Timestamp`]: wall-clock milliseconds used for TTL arithmetic

use std::cmp::Ordering;
use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::coordinate::Coordinate;

/// Opaque 128-bit node identifier.
///
/// Generated once per node instance. A node that restarts with a new
/// epoch gets a fresh identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(Uuid);

impl PeerId {
    /// Generate a fresh random identifier.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Build an identifier from its raw 128-bit value.
    pub fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Raw 128-bit value.
    pub fn as_u128(&self) -> u128 {
        self.0.as_u128()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First 8 hex digits are plenty for log correlation
        let simple = self.0.simple().to_string();
        write!(f, "{}", &simple[..8])
    }
}

/// Unix timestamp in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from milliseconds since the epoch.
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Milliseconds since the epoch.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Add milliseconds (saturating).
    pub fn add_millis(&self, millis: u64) -> Self {
        Self(self.0.saturating_add(millis))
    }

    /// Milliseconds elapsed since `earlier` (zero if `earlier` is later).
    pub fn millis_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

/// Everything a node advertises about itself.
///
/// Two records with the same `id` are ordered by `epoch`: the higher epoch
/// is newer and wins deduplication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Node identity.
    pub id: PeerId,
    /// Transport address other nodes connect to.
    pub address: SocketAddr,
    /// Logical cluster the node belongs to.
    pub cluster_name: String,
    /// Monotonic version counter, bumped whenever the record changes.
    pub epoch: u64,
    /// Wire protocol version the node speaks.
    pub protocol_version: u32,
    /// Last known network coordinate, if the node has published one.
    pub coordinate: Option<Coordinate>,
}

impl PeerRecord {
    /// Create a record at epoch 0 with no published coordinate.
    pub fn new(id: PeerId, address: SocketAddr, cluster_name: impl Into<String>) -> Self {
        Self {
            id,
            address,
            cluster_name: cluster_name.into(),
            epoch: 0,
            protocol_version: crate::domain::PROTOCOL_VERSION,
            coordinate: None,
        }
    }

    /// Builder-style epoch override.
    pub fn with_epoch(mut self, epoch: u64) -> Self {
        self.epoch = epoch;
        self
    }

    /// Builder-style protocol version override.
    pub fn with_protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }
}

/// A peer record as held by a gossip cache.
///
/// `expires_at` travels with the entry so that a record stops circulating
/// once the TTL set by its originator has elapsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub record: PeerRecord,
    /// Number of local gossip rounds this entry has survived.
    pub age: u32,
    /// Absolute expiry time, fixed when the entry is created.
    pub expires_at: Timestamp,
}

impl CacheEntry {
    /// Fresh entry expiring `ttl_millis` after `now`.
    pub fn new(record: PeerRecord, now: Timestamp, ttl_millis: u64) -> Self {
        Self {
            record,
            age: 0,
            expires_at: now.add_millis(ttl_millis),
        }
    }

    pub fn id(&self) -> PeerId {
        self.record.id
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }

    /// Freshness order between two entries for the same peer.
    ///
    /// Higher epoch wins; on equal epochs the later expiry wins.
    pub fn freshness_cmp(&self, other: &CacheEntry) -> Ordering {
        self.record
            .epoch
            .cmp(&other.record.epoch)
            .then(self.expires_at.cmp(&other.expires_at))
    }

    /// `true` if `self` should replace `other` in a deduplicated cache.
    pub fn is_newer_than(&self, other: &CacheEntry) -> bool {
        self.freshness_cmp(other) == Ordering::Greater
    }
}
