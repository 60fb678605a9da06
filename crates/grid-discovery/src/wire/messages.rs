//! Message types exchanged between nodes.

use serde::{Deserialize, Serialize};

use crate::domain::{CacheEntry, PeerRecord, WireError};

/// Opcode a requester sends to ask for the responder's `PeerRecord`.
pub const NODE_INFO_REQUEST: u8 = 0x01;

/// First byte of every connection; selects the responding service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServiceTag {
    Gossip = 1,
    Vivaldi = 2,
    NodeInfo = 3,
}

impl ServiceTag {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Result<Self, WireError> {
        match byte {
            1 => Ok(Self::Gossip),
            2 => Ok(Self::Vivaldi),
            3 => Ok(Self::NodeInfo),
            other => Err(WireError::UnknownService(other)),
        }
    }
}

/// Gossip request and reply share this encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipMessage {
    pub sender: PeerRecord,
    /// The node the sender believes it is talking to.
    pub receiver: PeerRecord,
    pub entries: Vec<CacheEntry>,
    pub is_request: bool,
    /// Wire name of the gossip variant, e.g. `"arrg"`.
    pub algorithm: String,
}
