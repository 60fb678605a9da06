//! Domain Layer - Pure logic with no I/O
//!
//! - Peer identity, records and cache entries
//! - The bounded, deduplicating, TTL-expiring peer cache
//! - Vivaldi coordinates and their update rule
//! - Per-neighbor RTT sample windows and distance sentinels

pub mod coordinate;
pub mod entities;
pub mod errors;
pub mod peer_cache;
pub mod samples;
pub mod value_objects;

pub use coordinate::*;
pub use entities::*;
pub use errors::*;
pub use peer_cache::*;
pub use samples::*;
pub use value_objects::*;
