//! Routes accepted connections to the owning service by [`ServiceTag`].

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::domain::{DiscoveryError, WireError};
use crate::ports::Connection;
use crate::service::{CoordinateEstimator, GossipService, NodeInfoService};
use crate::wire::ServiceTag;

/// Static dispatch table: one responder per service tag.
pub struct ConnectionDispatcher {
    gossip: Arc<GossipService>,
    vivaldi: Arc<CoordinateEstimator>,
    node_info: Arc<NodeInfoService>,
    timeout: Duration,
}

impl ConnectionDispatcher {
    pub fn new(
        gossip: Arc<GossipService>,
        vivaldi: Arc<CoordinateEstimator>,
        node_info: Arc<NodeInfoService>,
        timeout: Duration,
    ) -> Self {
        Self {
            gossip,
            vivaldi,
            node_info,
            timeout,
        }
    }

    /// Hand a stream whose tag byte was already consumed to its service.
    pub async fn dispatch(&self, tag: ServiceTag, stream: Connection) -> Result<(), DiscoveryError> {
        match tag {
            ServiceTag::Gossip => self.gossip.handle_connection(stream).await,
            ServiceTag::Vivaldi => self.vivaldi.handle_connection(stream).await,
            ServiceTag::NodeInfo => self.node_info.handle_connection(stream).await,
        }
    }

    /// Read the tag byte from a freshly accepted stream and dispatch it.
    ///
    /// Unknown tags close the connection without a reply. The tag read and
    /// the handler together are bounded by the connect timeout.
    pub async fn accept(&self, mut stream: Connection) -> Result<(), DiscoveryError> {
        let serve = async {
            let byte = stream.read_u8().await?;
            let tag = ServiceTag::from_byte(byte).map_err(|e: WireError| {
                debug!(tag = byte, "Dropping connection with unknown service tag");
                e
            })?;
            self.dispatch(tag, stream).await
        };
        tokio::time::timeout(self.timeout, serve)
            .await
            .map_err(|_| DiscoveryError::Timeout("inbound connection"))?
    }
}
