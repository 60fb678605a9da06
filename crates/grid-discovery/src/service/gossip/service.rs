//! Gossip service: every configured variant behind one membership view.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use super::engine::{EngineContext, GossipEngine};
use crate::domain::{DiscoveryConfig, DiscoveryError, GossipAlgorithm, GossipStats, PeerId, PeerRecord};
use crate::ports::{Connection, MembershipApi};
use crate::wire::{read_frame, write_frame, GossipMessage};

pub struct GossipService {
    engines: Vec<Arc<GossipEngine>>,
    ctx: EngineContext,
    max_message_bytes: usize,
    timeout: Duration,
}

impl GossipService {
    /// One engine per configured algorithm (duplicates ignored).
    pub fn new(config: DiscoveryConfig, ctx: EngineContext) -> Self {
        let mut engines: Vec<Arc<GossipEngine>> = Vec::with_capacity(config.algorithms.len());
        for algorithm in &config.algorithms {
            if engines.iter().any(|e| e.algorithm() == *algorithm) {
                continue;
            }
            engines.push(Arc::new(GossipEngine::new(
                *algorithm,
                config.clone(),
                ctx.clone(),
            )));
        }
        Self {
            engines,
            ctx,
            max_message_bytes: config.max_message_bytes,
            timeout: config.connect_timeout(),
        }
    }

    pub fn engines(&self) -> &[Arc<GossipEngine>] {
        &self.engines
    }

    pub fn engine(&self, algorithm: GossipAlgorithm) -> Option<&Arc<GossipEngine>> {
        self.engines.iter().find(|e| e.algorithm() == algorithm)
    }

    /// Engine for a wire algorithm name.
    pub fn engine_by_name(&self, name: &str) -> Result<&Arc<GossipEngine>, DiscoveryError> {
        GossipAlgorithm::from_name(name)
            .and_then(|algorithm| self.engine(algorithm))
            .ok_or_else(|| DiscoveryError::UnknownAlgorithm(name.to_string()))
    }

    /// Route a decoded request to the engine it names.
    pub fn handle_request(&self, request: GossipMessage) -> Result<GossipMessage, DiscoveryError> {
        self.engine_by_name(&request.algorithm)?.handle_request(request)
    }

    /// Responder side of one exchange.
    ///
    /// Malformed, oversized or unroutable requests close the connection
    /// without a reply and leave every cache untouched. A requester that
    /// stays silent past the connect timeout is dropped the same way.
    pub async fn handle_connection(&self, mut stream: Connection) -> Result<(), DiscoveryError> {
        let max = self.max_message_bytes;
        let request: GossipMessage =
            tokio::time::timeout(self.timeout, read_frame(&mut stream, max))
                .await
                .map_err(|_| DiscoveryError::Timeout("gossip request"))??;
        let reply = self.handle_request(request).map_err(|e| {
            debug!(error = %e, "Rejecting gossip request");
            e
        })?;
        tokio::time::timeout(self.timeout, write_frame(&mut stream, &reply, max))
            .await
            .map_err(|_| DiscoveryError::Timeout("gossip reply"))??;
        Ok(())
    }

    /// One round loop per engine.
    pub fn spawn_loops(&self, shutdown: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.engines
            .iter()
            .map(|engine| tokio::spawn(Arc::clone(engine).run(shutdown.clone())))
            .collect()
    }
}

impl MembershipApi for GossipService {
    fn get_nodes(&self) -> Vec<PeerRecord> {
        let mut newest: HashMap<PeerId, PeerRecord> = HashMap::new();
        for record in self.engines.iter().flat_map(|e| e.get_nodes()) {
            match newest.get(&record.id) {
                Some(existing) if existing.epoch >= record.epoch => {}
                _ => {
                    newest.insert(record.id, record);
                }
            }
        }
        newest.into_values().collect()
    }

    fn get_random_node(&self) -> Option<PeerRecord> {
        let nodes = self.get_nodes();
        if nodes.is_empty() {
            return None;
        }
        let index = self.ctx.random.random_usize(nodes.len());
        nodes.into_iter().nth(index)
    }

    fn get_random_nodes(&self, n: usize) -> Vec<PeerRecord> {
        let mut nodes = self.get_nodes();
        let take = n.min(nodes.len());
        // Partial Fisher-Yates
        for i in 0..take {
            let j = i + self.ctx.random.random_usize(nodes.len() - i);
            nodes.swap(i, j);
        }
        nodes.truncate(take);
        nodes
    }

    fn get_fallback_nodes(&self) -> Vec<PeerRecord> {
        let mut seen = HashMap::new();
        for record in self.engines.iter().flat_map(|e| e.get_fallback_nodes()) {
            seen.entry(record.id).or_insert(record);
        }
        seen.into_values().collect()
    }

    fn get_stats(&self) -> Vec<GossipStats> {
        self.engines.iter().map(|e| e.get_stats()).collect()
    }
}
