//! Domain Errors for Grid Discovery

use std::net::SocketAddr;

use thiserror::Error;

use super::entities::PeerId;

/// Errors surfaced by discovery operations.
///
/// Background loops log these and carry on; only startup paths propagate
/// them further.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Reply came from a different node than the one we contacted
    #[error("identity mismatch: expected {expected}, got {actual}")]
    IdentityMismatch { expected: PeerId, actual: PeerId },

    /// Request named a gossip variant this node does not run
    #[error("unknown gossip algorithm: {0}")]
    UnknownAlgorithm(String),

    /// Well-formed message that does not fit the exchange in progress
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    /// Echoed ping byte differs from the one sent
    #[error("echo mismatch: sent {sent}, received {received}")]
    EchoMismatch { sent: u8, received: u8 },

    #[error("invalid latency sample: {0}")]
    InvalidSample(String),

    #[error("operation timed out: {0}")]
    Timeout(&'static str),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors raised by a [`Transport`](crate::ports::Transport) implementation.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to {addr} failed: {reason}")]
    ConnectFailed { addr: SocketAddr, reason: String },

    #[error("connection to {addr} timed out")]
    Timeout { addr: SocketAddr },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while encoding or decoding wire messages.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("message of {size} bytes exceeds limit of {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("encoding failed: {0}")]
    Encode(String),

    #[error("decoding failed: {0}")]
    Decode(String),

    #[error("unknown service tag: {0:#04x}")]
    UnknownService(u8),

    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<std::io::Error> for DiscoveryError {
    fn from(error: std::io::Error) -> Self {
        Self::Wire(WireError::Io(error))
    }
}

impl WireError {
    /// `true` when the peer simply closed the stream.
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}

/// Result alias for discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;
