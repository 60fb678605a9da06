//! # Wire Formats
//!
//! - Length-prefixed `bincode` frames (4-byte big-endian length)
//! - Fixed-size coordinate encoding for the ping sub-protocol
//! - Gossip exchange message and per-service tags

mod codec;
mod coordinate;
mod messages;

pub use codec::{decode_frame, encode_frame, read_frame, write_frame};
pub use coordinate::{
    decode_coordinate, encode_coordinate, read_coordinate, write_coordinate, COORDINATE_WIRE_LEN,
};
pub use messages::{GossipMessage, ServiceTag, NODE_INFO_REQUEST};
