//! Tests for gossip engines and the gossip service

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::adapters::{StaticBootstrap, ThreadRandomSource};
use crate::domain::{
    CacheEntry, DiscoveryConfig, DiscoveryError, GossipAlgorithm, PeerRecord, Timestamp,
};
use crate::ports::{MembershipApi, RandomSource};
use crate::service::LocalNode;
use crate::test_utils::{
    make_address, make_peer_id, make_record, ControllableTimeSource, MemoryNetwork, TestNode,
};
use crate::wire::GossipMessage;

// =============================================================================
// TEST HELPERS
// =============================================================================

fn rng(seed: u64) -> Arc<dyn RandomSource> {
    Arc::new(ThreadRandomSource::from_seed(seed))
}

fn config_with(algorithms: Vec<GossipAlgorithm>) -> DiscoveryConfig {
    DiscoveryConfig {
        algorithms,
        ..DiscoveryConfig::for_testing()
    }
}

fn entry_for(record: PeerRecord) -> CacheEntry {
    CacheEntry::new(record, Timestamp::from_millis(0), 60_000)
}

fn engine(node: &TestNode, algorithm: GossipAlgorithm) -> Arc<GossipEngine> {
    Arc::clone(node.gossip.engine(algorithm).unwrap())
}

// =============================================================================
// TEST GROUP 1: Rounds
// =============================================================================

#[tokio::test]
async fn test_round_with_empty_cache_is_skipped() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, DiscoveryConfig::for_testing(), rng(1));

    for engine in a.gossip.engines() {
        assert_eq!(engine.do_gossip().await.unwrap(), RoundOutcome::Skipped);
    }
}

#[tokio::test]
async fn test_exchange_merges_both_caches() {
    let network = MemoryNetwork::new();
    let config = config_with(vec![GossipAlgorithm::Arrg]);
    let a = TestNode::start(&network, 1, config.clone(), rng(1));
    let b = TestNode::start(&network, 2, config, rng(2));

    let a_arrg = engine(&a, GossipAlgorithm::Arrg);
    let b_arrg = engine(&b, GossipAlgorithm::Arrg);
    a_arrg.cache().add(entry_for(b.record()));
    b_arrg.cache().add(entry_for(make_record(3)));

    let outcome = a_arrg.do_gossip().await.unwrap();

    assert!(matches!(
        outcome,
        RoundOutcome::Exchanged { via_fallback: false, .. }
    ));
    assert!(a_arrg.cache().contains(&make_peer_id(3)));
    assert!(b_arrg.cache().contains(&a.id()));
    assert!(!a_arrg.cache().contains(&a.id()));
    assert!(!b_arrg.cache().contains(&b.id()));

    // Successful partner lands in the fallback cache
    let fallback: Vec<_> = a_arrg.get_fallback_nodes().iter().map(|r| r.id).collect();
    assert_eq!(fallback, vec![b.id()]);
}

#[tokio::test]
async fn test_failed_exchange_without_fallback_changes_nothing() {
    let network = MemoryNetwork::new();
    let config = config_with(vec![GossipAlgorithm::Cyclon]);
    let a = TestNode::start(&network, 1, config.clone(), rng(1));
    let b = TestNode::start(&network, 2, config, rng(2));
    network.set_down(b.address(), true);

    let cyclon = engine(&a, GossipAlgorithm::Cyclon);
    cyclon.cache().add(entry_for(b.record()));
    let before: Vec<_> = cyclon.get_nodes();

    let result = cyclon.do_gossip().await;

    assert!(matches!(result, Err(DiscoveryError::Transport(_))));
    assert_eq!(cyclon.get_nodes(), before);
    assert_eq!(cyclon.get_stats().failures, 1);
}

#[tokio::test]
async fn test_failed_exchange_retries_through_fallback() {
    let network = MemoryNetwork::new();
    let config = config_with(vec![GossipAlgorithm::Arrg]);
    let a = TestNode::start(&network, 1, config.clone(), rng(1));
    let b = TestNode::start(&network, 2, config.clone(), rng(2));
    let c = TestNode::start(&network, 3, config.clone(), rng(3));
    network.set_down(b.address(), true);

    let arrg = engine(&a, GossipAlgorithm::Arrg);
    arrg.cache().add(entry_for(b.record()));
    arrg.fallback_cache()
        .unwrap()
        .replace(entry_for(c.record()), config.fallback_cache_size);

    let outcome = arrg.do_gossip().await.unwrap();

    assert_eq!(
        outcome,
        RoundOutcome::Exchanged {
            peer: c.id(),
            // C's cache is empty, so only its self entry comes back
            received: 1,
            via_fallback: true,
        }
    );
    let stats = arrg.get_stats();
    assert_eq!(stats.fallback_retries, 1);
    assert_eq!(stats.exchanges, 1);
    assert_eq!(stats.failures, 0);
    assert!(engine(&c, GossipAlgorithm::Arrg).cache().contains(&a.id()));
}

#[tokio::test]
async fn test_reply_from_unexpected_node_is_rejected() {
    let network = MemoryNetwork::new();
    let config = config_with(vec![GossipAlgorithm::Cyclon]);
    let a = TestNode::start(&network, 1, config.clone(), rng(1));
    let _b = TestNode::start(&network, 2, config, rng(2));

    // Stale record: some other node used to live at B's address
    let stale = PeerRecord::new(make_peer_id(99), make_address(2), "test");
    let cyclon = engine(&a, GossipAlgorithm::Cyclon);
    cyclon.cache().add(entry_for(stale));

    let result = cyclon.do_gossip().await;

    assert!(matches!(
        result,
        Err(DiscoveryError::IdentityMismatch { .. })
    ));
    assert!(!cyclon.cache().contains(&make_peer_id(2)));
}

#[tokio::test]
async fn test_cyclon_ages_entries_every_round() {
    let network = MemoryNetwork::new();
    let config = config_with(vec![GossipAlgorithm::Cyclon]);
    let a = TestNode::start(&network, 1, config.clone(), rng(1));
    let b = TestNode::start(&network, 2, config, rng(2));
    network.set_down(b.address(), true);

    let cyclon = engine(&a, GossipAlgorithm::Cyclon);
    cyclon.cache().add(entry_for(b.record()));
    let _ = cyclon.do_gossip().await;
    let _ = cyclon.do_gossip().await;

    assert_eq!(cyclon.cache().entries()[0].age, 2);
}

#[tokio::test]
async fn test_cyclon_gossips_with_oldest_entry() {
    let network = MemoryNetwork::new();
    let config = config_with(vec![GossipAlgorithm::Cyclon]);
    let a = TestNode::start(&network, 1, config.clone(), rng(1));
    let b = TestNode::start(&network, 2, config.clone(), rng(2));
    let c = TestNode::start(&network, 3, config.clone(), rng(3));
    let d = TestNode::start(&network, 4, config, rng(4));

    let cyclon = engine(&a, GossipAlgorithm::Cyclon);
    cyclon.cache().add(entry_for(c.record()));
    cyclon.cache().increment_ages();
    cyclon.cache().add(entry_for(b.record()));
    cyclon.cache().add(entry_for(d.record()));
    for node in [&b, &c, &d] {
        assert!(cyclon.cache().contains(&node.id()));
    }

    let outcome = cyclon.do_gossip().await.unwrap();

    assert!(matches!(
        outcome,
        RoundOutcome::Exchanged { peer, via_fallback: false, .. } if peer == c.id()
    ));
    assert!(engine(&c, GossipAlgorithm::Cyclon).cache().contains(&a.id()));
    assert!(!engine(&b, GossipAlgorithm::Cyclon).cache().contains(&a.id()));
    assert!(!engine(&d, GossipAlgorithm::Cyclon).cache().contains(&a.id()));
}

#[tokio::test(start_paused = true)]
async fn test_slow_peer_fails_over_within_half_timeout() {
    let network = MemoryNetwork::new();
    let config = config_with(vec![GossipAlgorithm::Arrg]);
    let a = TestNode::start(&network, 1, config.clone(), rng(1));
    let b = TestNode::start(&network, 2, config.clone(), rng(2));
    let c = TestNode::start(&network, 3, config.clone(), rng(3));
    // Reply arrives in two delayed reads: ~600ms, inside the full timeout
    // but past the half granted to each attempt
    network.set_latency(b.address(), Duration::from_millis(300));

    let arrg = engine(&a, GossipAlgorithm::Arrg);
    arrg.cache().add(entry_for(b.record()));
    arrg.fallback_cache()
        .unwrap()
        .replace(entry_for(c.record()), config.fallback_cache_size);
    let started = tokio::time::Instant::now();

    let outcome = arrg.do_gossip().await.unwrap();

    assert_eq!(
        outcome,
        RoundOutcome::Exchanged {
            peer: c.id(),
            received: 1,
            via_fallback: true,
        }
    );
    assert_eq!(arrg.get_stats().fallback_retries, 1);
    let elapsed = started.elapsed();
    assert!(elapsed >= config.connect_timeout() / 2, "elapsed {elapsed:?}");
    assert!(elapsed < config.connect_timeout(), "elapsed {elapsed:?}");
}

// =============================================================================
// TEST GROUP 2: Bootstrap
// =============================================================================

fn bootstrapped_engine(
    network: &Arc<MemoryNetwork>,
    seed: PeerRecord,
) -> (GossipEngine, Arc<ControllableTimeSource>) {
    let time = Arc::new(ControllableTimeSource::new(0));
    let ctx = EngineContext {
        local: Arc::new(LocalNode::new(make_record(1))),
        transport: Arc::new(network.transport()),
        bootstrap: Some(Arc::new(StaticBootstrap::new(vec![seed]))),
        time: time.clone(),
        random: rng(5),
    };
    let engine = GossipEngine::new(GossipAlgorithm::Cyclon, DiscoveryConfig::for_testing(), ctx);
    (engine, time)
}

#[tokio::test]
async fn test_bootstrap_seeds_empty_cache_within_window() {
    let network = MemoryNetwork::new();
    let b = TestNode::start(&network, 2, DiscoveryConfig::for_testing(), rng(2));
    let (engine, _) = bootstrapped_engine(&network, b.record());

    let outcome = engine.do_gossip().await.unwrap();

    assert!(matches!(outcome, RoundOutcome::Exchanged { peer, .. } if peer == b.id()));
    assert!(engine.cache().contains(&b.id()));
}

#[tokio::test]
async fn test_bootstrap_ignored_after_window() {
    let network = MemoryNetwork::new();
    let b = TestNode::start(&network, 2, DiscoveryConfig::for_testing(), rng(2));
    let (engine, time) = bootstrapped_engine(&network, b.record());
    time.advance(DiscoveryConfig::for_testing().bootstrap_window_ms);

    assert_eq!(engine.do_gossip().await.unwrap(), RoundOutcome::Skipped);
    assert!(engine.cache().is_empty());
}

// =============================================================================
// TEST GROUP 3: Service
// =============================================================================

#[tokio::test]
async fn test_unknown_algorithm_is_rejected() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, DiscoveryConfig::for_testing(), rng(1));
    let request = GossipMessage {
        sender: make_record(2),
        receiver: a.record(),
        entries: vec![entry_for(make_record(2))],
        is_request: true,
        algorithm: "newscast".into(),
    };

    let result = a.gossip.handle_request(request);

    assert!(matches!(result, Err(DiscoveryError::UnknownAlgorithm(name)) if name == "newscast"));
    assert!(a.gossip.get_nodes().is_empty());
}

#[tokio::test]
async fn test_request_routed_to_named_engine() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, DiscoveryConfig::for_testing(), rng(1));
    let request = GossipMessage {
        sender: make_record(2),
        receiver: a.record(),
        entries: vec![entry_for(make_record(2))],
        is_request: true,
        algorithm: "cyclon".into(),
    };

    let reply = a.gossip.handle_request(request).unwrap();

    assert!(!reply.is_request);
    assert_eq!(reply.algorithm, "cyclon");
    assert_eq!(reply.sender.id, a.id());
    assert_eq!(reply.receiver.id, make_peer_id(2));
    assert!(engine(&a, GossipAlgorithm::Cyclon).cache().contains(&make_peer_id(2)));
    assert!(!engine(&a, GossipAlgorithm::Arrg).cache().contains(&make_peer_id(2)));
}

#[tokio::test]
async fn test_get_nodes_dedups_across_variants() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, DiscoveryConfig::for_testing(), rng(1));
    engine(&a, GossipAlgorithm::Arrg)
        .cache()
        .add(entry_for(make_record(5).with_epoch(1)));
    engine(&a, GossipAlgorithm::Cyclon)
        .cache()
        .add(entry_for(make_record(5).with_epoch(3)));

    let nodes = a.gossip.get_nodes();

    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].epoch, 3);
    assert_eq!(a.gossip.get_random_node().unwrap().id, make_peer_id(5));
    assert_eq!(a.gossip.get_random_nodes(10).len(), 1);
}

#[tokio::test]
async fn test_stats_track_exchanges_and_network_size() {
    let network = MemoryNetwork::new();
    let config = config_with(vec![GossipAlgorithm::Cyclon]);
    let a = TestNode::start(&network, 1, config.clone(), rng(1));
    let b = TestNode::start(&network, 2, config, rng(2));
    let cyclon_b = engine(&b, GossipAlgorithm::Cyclon);
    cyclon_b.cache().add(entry_for(make_record(7)));
    cyclon_b.cache().add(entry_for(make_record(8)));

    let cyclon_a = engine(&a, GossipAlgorithm::Cyclon);
    cyclon_a.cache().add(entry_for(b.record()));
    cyclon_a.do_gossip().await.unwrap();

    let stats = a.gossip.get_stats();
    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].algorithm, "cyclon");
    assert_eq!(stats[0].exchanges, 1);
    // Reply carries two cached peers plus B itself
    assert_eq!(stats[0].network_size_estimate, 3);
    assert_eq!(cyclon_b.get_stats().requests_served, 1);
}
