//! One gossip variant's exchange engine.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, info, trace};

use crate::domain::{
    CacheEntry, DiscoveryConfig, DiscoveryError, GossipAlgorithm, GossipPolicy, GossipStats,
    PeerCache, PeerId, PeerRecord, TargetSelection, Timestamp,
};
use crate::ports::{BootstrapSource, RandomSource, TimeSource, Transport};
use crate::service::LocalNode;
use crate::wire::{read_frame, write_frame, GossipMessage, ServiceTag};

/// Received payloads remembered for the network size estimate.
const SIZE_ESTIMATE_WINDOW: usize = 64;

/// How a round ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundOutcome {
    /// Empty cache or self-selected target.
    Skipped,
    Exchanged {
        peer: PeerId,
        received: usize,
        via_fallback: bool,
    },
}

#[derive(Debug, Default)]
struct Counters {
    exchanges: u64,
    failures: u64,
    fallback_retries: u64,
    requests_served: u64,
    observed: VecDeque<Vec<PeerId>>,
}

/// Shared collaborators every engine needs.
#[derive(Clone)]
pub struct EngineContext {
    pub local: Arc<LocalNode>,
    pub transport: Arc<dyn Transport>,
    pub bootstrap: Option<Arc<dyn BootstrapSource>>,
    pub time: Arc<dyn TimeSource>,
    pub random: Arc<dyn RandomSource>,
}

/// Exchange engine for one [`GossipAlgorithm`].
///
/// All variants share this code; the [`GossipPolicy`] decides the cache
/// eviction policy and whether a fallback cache backs failed rounds.
pub struct GossipEngine {
    algorithm: GossipAlgorithm,
    policy: GossipPolicy,
    config: DiscoveryConfig,
    cache: PeerCache,
    fallback: Option<PeerCache>,
    ctx: EngineContext,
    started_at: Timestamp,
    counters: Mutex<Counters>,
}

impl GossipEngine {
    pub fn new(algorithm: GossipAlgorithm, config: DiscoveryConfig, ctx: EngineContext) -> Self {
        let policy = algorithm.policy();
        let local_id = ctx.local.id();
        let make_cache = |capacity| {
            PeerCache::new(
                local_id,
                capacity,
                config.protocol_version,
                policy.eviction,
                Arc::clone(&ctx.time),
                Arc::clone(&ctx.random),
            )
        };
        let cache = make_cache(config.cache_size);
        let fallback = policy
            .use_fallback
            .then(|| make_cache(config.fallback_cache_size));

        Self {
            algorithm,
            policy,
            started_at: ctx.time.now(),
            config,
            cache,
            fallback,
            ctx,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn algorithm(&self) -> GossipAlgorithm {
        self.algorithm
    }

    pub fn policy(&self) -> GossipPolicy {
        self.policy
    }

    /// Primary cache, for seeding and inspection.
    pub fn cache(&self) -> &PeerCache {
        &self.cache
    }

    pub fn fallback_cache(&self) -> Option<&PeerCache> {
        self.fallback.as_ref()
    }

    /// Run one gossip round.
    ///
    /// Errors mean the round exchanged nothing; the cache is unchanged
    /// apart from aging and bootstrap seeding.
    pub async fn do_gossip(&self) -> Result<RoundOutcome, DiscoveryError> {
        self.seed_from_bootstrap().await;
        self.cache.increment_ages();

        let target = match self.policy.selection {
            TargetSelection::Random => self.cache.select_random_entry(),
            TargetSelection::Oldest => self.cache.select_oldest_entry(),
        };
        let Some(target) = target else {
            trace!(algorithm = %self.algorithm, "Empty cache, skipping round");
            return Ok(RoundOutcome::Skipped);
        };
        if target.id() == self.ctx.local.id() {
            return Ok(RoundOutcome::Skipped);
        }

        let retry = self.config.gossip_retry && self.fallback.is_some();
        let timeout = if retry {
            self.config.connect_timeout() / 2
        } else {
            self.config.connect_timeout()
        };

        let first_error = match self.exchange(&target.record, timeout).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) => e,
        };
        debug!(
            algorithm = %self.algorithm,
            peer_id = %target.id(),
            error = %first_error,
            "Gossip exchange failed"
        );

        let retry_target = if retry {
            self.fallback_target(target.id())
        } else {
            None
        };
        let Some(retry_target) = retry_target else {
            self.counters.lock().failures += 1;
            return Err(first_error);
        };

        self.counters.lock().fallback_retries += 1;
        match self.exchange(&retry_target, timeout).await {
            Ok(RoundOutcome::Exchanged { peer, received, .. }) => Ok(RoundOutcome::Exchanged {
                peer,
                received,
                via_fallback: true,
            }),
            Ok(other) => Ok(other),
            Err(e) => {
                self.counters.lock().failures += 1;
                debug!(
                    algorithm = %self.algorithm,
                    peer_id = %retry_target.id,
                    error = %e,
                    "Fallback exchange failed"
                );
                Err(e)
            }
        }
    }

    /// Answer an inbound request: reply from the current cache, then merge
    /// the request's entries.
    pub fn handle_request(&self, request: GossipMessage) -> Result<GossipMessage, DiscoveryError> {
        if request.algorithm != self.algorithm.name() {
            return Err(DiscoveryError::UnknownAlgorithm(request.algorithm));
        }
        if !request.is_request {
            return Err(DiscoveryError::UnexpectedMessage(
                "gossip reply received as request".into(),
            ));
        }
        if request.receiver.id != self.ctx.local.id() {
            debug!(
                algorithm = %self.algorithm,
                addressed_to = %request.receiver.id,
                "Answering request addressed to a previous node at this address"
            );
        }

        let reply = GossipMessage {
            sender: self.ctx.local.record(),
            receiver: request.sender,
            entries: self.build_payload(),
            is_request: false,
            algorithm: self.algorithm.name().to_string(),
        };

        self.observe(&request.entries);
        self.cache.add_all(request.entries);
        self.counters.lock().requests_served += 1;
        Ok(reply)
    }

    pub fn get_nodes(&self) -> Vec<PeerRecord> {
        self.cache.records()
    }

    pub fn get_random_node(&self) -> Option<PeerRecord> {
        self.cache.select_random_entry().map(|e| e.record)
    }

    pub fn get_random_nodes(&self, n: usize) -> Vec<PeerRecord> {
        self.cache
            .select_random(n)
            .into_iter()
            .map(|e| e.record)
            .collect()
    }

    pub fn get_fallback_nodes(&self) -> Vec<PeerRecord> {
        self.fallback
            .as_ref()
            .map(PeerCache::records)
            .unwrap_or_default()
    }

    pub fn get_stats(&self) -> GossipStats {
        let counters = self.counters.lock();
        let distinct: HashSet<PeerId> = counters.observed.iter().flatten().copied().collect();
        GossipStats {
            algorithm: self.algorithm.name().to_string(),
            exchanges: counters.exchanges,
            failures: counters.failures,
            fallback_retries: counters.fallback_retries,
            requests_served: counters.requests_served,
            network_size_estimate: distinct.len(),
            cache_size: self.cache.len(),
            fallback_size: self.fallback.as_ref().map_or(0, PeerCache::len),
        }
    }

    /// Round loop on a jittered interval, until `shutdown` fires.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        info!(algorithm = %self.algorithm, "Gossip loop started");
        loop {
            let delay = self.ctx.random.jittered(self.config.gossip_interval());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
            match self.do_gossip().await {
                Ok(RoundOutcome::Exchanged {
                    peer,
                    received,
                    via_fallback,
                }) => debug!(
                    algorithm = %self.algorithm,
                    peer_id = %peer,
                    received,
                    via_fallback,
                    cache_size = self.cache.len(),
                    "Gossip round completed"
                ),
                Ok(RoundOutcome::Skipped) => {}
                Err(e) => debug!(algorithm = %self.algorithm, error = %e, "Gossip round failed"),
            }
        }
        info!(algorithm = %self.algorithm, "Gossip loop stopped");
    }

    /// `send_size - 1` random cache entries plus a fresh self entry.
    fn build_payload(&self) -> Vec<CacheEntry> {
        let mut payload = self
            .cache
            .select_random(self.config.send_size.saturating_sub(1));
        payload.push(self.self_entry());
        payload
    }

    fn self_entry(&self) -> CacheEntry {
        CacheEntry::new(
            self.ctx.local.record(),
            self.ctx.time.now(),
            self.config.entry_ttl_ms,
        )
    }

    async fn seed_from_bootstrap(&self) {
        let Some(bootstrap) = &self.ctx.bootstrap else {
            return;
        };
        if self.cache.len() >= self.cache.capacity() {
            return;
        }
        let now = self.ctx.time.now();
        if now.millis_since(self.started_at) >= self.config.bootstrap_window_ms {
            return;
        }
        let Some(record) = bootstrap.bootstrap_peer().await else {
            return;
        };
        if record.id == self.ctx.local.id() || self.cache.contains(&record.id) {
            return;
        }
        debug!(algorithm = %self.algorithm, peer_id = %record.id, "Seeding cache from bootstrap");
        self.cache
            .add(CacheEntry::new(record, now, self.config.entry_ttl_ms));
    }

    fn fallback_target(&self, failed: PeerId) -> Option<PeerRecord> {
        let local_id = self.ctx.local.id();
        let pool: Vec<PeerRecord> = self
            .fallback
            .as_ref()?
            .records()
            .into_iter()
            .filter(|r| r.id != failed && r.id != local_id)
            .collect();
        if pool.is_empty() {
            return None;
        }
        let index = self.ctx.random.random_usize(pool.len());
        pool.into_iter().nth(index)
    }

    /// One request/reply exchange with `target`, merging the reply.
    async fn exchange(
        &self,
        target: &PeerRecord,
        timeout: Duration,
    ) -> Result<RoundOutcome, DiscoveryError> {
        let request = GossipMessage {
            sender: self.ctx.local.record(),
            receiver: target.clone(),
            entries: self.build_payload(),
            is_request: true,
            algorithm: self.algorithm.name().to_string(),
        };
        let max = self.config.max_message_bytes;

        let round_trip = async {
            let mut stream = self
                .ctx
                .transport
                .connect(target.address, ServiceTag::Gossip, timeout)
                .await?;
            write_frame(&mut stream, &request, max).await?;
            let reply: GossipMessage = read_frame(&mut stream, max).await?;
            Ok::<_, DiscoveryError>(reply)
        };
        let reply = tokio::time::timeout(timeout, round_trip)
            .await
            .map_err(|_| DiscoveryError::Timeout("gossip exchange"))??;

        if reply.is_request || reply.algorithm != self.algorithm.name() {
            return Err(DiscoveryError::UnexpectedMessage(format!(
                "expected {} reply, got {} {}",
                self.algorithm,
                reply.algorithm,
                if reply.is_request { "request" } else { "reply" }
            )));
        }
        if reply.sender.id != target.id {
            return Err(DiscoveryError::IdentityMismatch {
                expected: target.id,
                actual: reply.sender.id,
            });
        }

        let received = reply.entries.len();
        self.observe(&reply.entries);
        self.cache.add_all(reply.entries);

        if let Some(fallback) = &self.fallback {
            fallback.replace(
                CacheEntry::new(reply.sender, self.ctx.time.now(), self.config.entry_ttl_ms),
                self.config.fallback_cache_size,
            );
        }
        self.counters.lock().exchanges += 1;

        Ok(RoundOutcome::Exchanged {
            peer: target.id,
            received,
            via_fallback: false,
        })
    }

    fn observe(&self, entries: &[CacheEntry]) {
        let mut counters = self.counters.lock();
        if counters.observed.len() == SIZE_ESTIMATE_WINDOW {
            counters.observed.pop_front();
        }
        counters.observed.push_back(entries.iter().map(CacheEntry::id).collect());
    }
}
