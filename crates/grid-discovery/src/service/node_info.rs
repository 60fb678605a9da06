//! Node-info responder and client.
//!
//! The requester sends [`NODE_INFO_REQUEST`]; the responder answers with
//! one frame holding its current `PeerRecord` and closes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use crate::domain::{DiscoveryError, PeerRecord, WireError};
use crate::ports::{Connection, Transport};
use crate::service::LocalNode;
use crate::wire::{read_frame, write_frame, ServiceTag, NODE_INFO_REQUEST};

/// Answers node-info requests with the local record.
#[derive(Debug)]
pub struct NodeInfoService {
    local: Arc<LocalNode>,
    max_message_bytes: usize,
    timeout: Duration,
}

impl NodeInfoService {
    pub fn new(local: Arc<LocalNode>, max_message_bytes: usize, timeout: Duration) -> Self {
        Self {
            local,
            max_message_bytes,
            timeout,
        }
    }

    pub async fn handle_connection(&self, mut stream: Connection) -> Result<(), DiscoveryError> {
        let answer = async {
            let opcode = stream.read_u8().await?;
            if opcode != NODE_INFO_REQUEST {
                debug!(opcode, "Rejecting node-info request with unknown opcode");
                return Err(WireError::UnknownOpcode(opcode).into());
            }
            write_frame(&mut stream, &self.local.record(), self.max_message_bytes).await?;
            Ok::<_, DiscoveryError>(())
        };
        tokio::time::timeout(self.timeout, answer)
            .await
            .map_err(|_| DiscoveryError::Timeout("node-info response"))?
    }
}

/// Ask the node at `addr` for its current record.
///
/// The whole exchange, connect included, is bounded by `timeout`.
pub async fn request_node_info(
    transport: &dyn Transport,
    addr: SocketAddr,
    timeout: Duration,
    max_message_bytes: usize,
) -> Result<PeerRecord, DiscoveryError> {
    let exchange = async {
        let mut stream = transport.connect(addr, ServiceTag::NodeInfo, timeout).await?;
        stream.write_u8(NODE_INFO_REQUEST).await?;
        stream.flush().await?;
        let record: PeerRecord = read_frame(&mut stream, max_message_bytes).await?;
        Ok::<_, DiscoveryError>(record)
    };
    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| DiscoveryError::Timeout("node-info request"))?
}
