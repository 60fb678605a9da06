//! Bootstrap Source Adapters

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::domain::PeerRecord;
use crate::ports::{BootstrapSource, RandomSource, Transport};
use crate::service::request_node_info;

/// Asks a random well-known address for its node-info record.
pub struct NodeInfoBootstrap {
    addresses: Vec<SocketAddr>,
    transport: Arc<dyn Transport>,
    random: Arc<dyn RandomSource>,
    timeout: Duration,
    max_message_bytes: usize,
}

impl NodeInfoBootstrap {
    pub fn new(
        addresses: Vec<SocketAddr>,
        transport: Arc<dyn Transport>,
        random: Arc<dyn RandomSource>,
        timeout: Duration,
        max_message_bytes: usize,
    ) -> Self {
        Self {
            addresses,
            transport,
            random,
            timeout,
            max_message_bytes,
        }
    }
}

#[async_trait]
impl BootstrapSource for NodeInfoBootstrap {
    async fn bootstrap_peer(&self) -> Option<PeerRecord> {
        if self.addresses.is_empty() {
            return None;
        }
        let addr = self.addresses[self.random.random_usize(self.addresses.len())];
        match request_node_info(
            self.transport.as_ref(),
            addr,
            self.timeout,
            self.max_message_bytes,
        )
        .await
        {
            Ok(record) => Some(record),
            Err(e) => {
                debug!(%addr, error = %e, "Bootstrap node unavailable");
                None
            }
        }
    }
}

/// Fixed list of records, handed out in rotation.
#[derive(Debug, Default)]
pub struct StaticBootstrap {
    records: Vec<PeerRecord>,
    next: parking_lot::Mutex<usize>,
}

impl StaticBootstrap {
    pub fn new(records: Vec<PeerRecord>) -> Self {
        Self {
            records,
            next: parking_lot::Mutex::new(0),
        }
    }
}

#[async_trait]
impl BootstrapSource for StaticBootstrap {
    async fn bootstrap_peer(&self) -> Option<PeerRecord> {
        if self.records.is_empty() {
            return None;
        }
        let mut next = self.next.lock();
        let record = self.records[*next % self.records.len()].clone();
        *next = next.wrapping_add(1);
        Some(record)
    }
}
