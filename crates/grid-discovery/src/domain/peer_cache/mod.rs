//! # Peer Cache
//!
//! Substrate of every gossip exchange: a bounded store of peer records
//! with deduplication by freshness, TTL expiry and a per-instance
//! eviction policy.

mod cache;

pub use cache::PeerCache;
