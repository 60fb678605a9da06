//! Tests for the coordinate estimator, neighbor trackers, cluster
//! maintenance, node-info and connection dispatch

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use super::*;
use crate::adapters::ThreadRandomSource;
use crate::domain::{
    CacheEntry, Coordinate, DiscoveryConfig, DiscoveryError, Distance, GossipAlgorithm,
    PeerRecord, Timestamp, TransportError, WireError,
};
use crate::ports::{Connection, MembershipApi, ProximityApi, RandomSource, Transport};
use crate::test_utils::{make_address, make_peer_id, MemoryNetwork, TestNode};
use crate::wire::{write_coordinate, ServiceTag};

// =============================================================================
// TEST HELPERS
// =============================================================================

fn rng(seed: u64) -> Arc<dyn RandomSource> {
    Arc::new(ThreadRandomSource::from_seed(seed))
}

fn fast_config() -> DiscoveryConfig {
    DiscoveryConfig {
        ping_tries: 1,
        sample_window: 2,
        neighbor_ping_interval_ms: 1_000,
        ..DiscoveryConfig::for_testing()
    }
}

fn seed_gossip(node: &TestNode, records: &[PeerRecord]) {
    let engine = node.gossip.engine(GossipAlgorithm::Cyclon).unwrap();
    for record in records {
        engine
            .cache()
            .add(CacheEntry::new(record.clone(), Timestamp::from_millis(0), 60_000));
    }
}

fn dispatcher_for(node: &TestNode) -> ConnectionDispatcher {
    let timeout = node.config.connect_timeout();
    let node_info = Arc::new(NodeInfoService::new(Arc::clone(&node.local), 1024, timeout));
    ConnectionDispatcher::new(
        Arc::clone(&node.gossip),
        Arc::clone(&node.estimator),
        node_info,
        timeout,
    )
}

/// Drive a responder with a generous outer bound so a hang fails the test.
async fn within_an_hour<T>(responder: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(3_600), responder)
        .await
        .expect("responder still waiting after an hour")
}

/// Responder that echoes every byte back incremented.
struct CorruptEchoTransport;

#[async_trait]
impl Transport for CorruptEchoTransport {
    async fn connect(
        &self,
        _addr: SocketAddr,
        _tag: ServiceTag,
        _timeout: Duration,
    ) -> Result<Connection, TransportError> {
        let (client, mut server) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            if write_coordinate(&mut server, &Coordinate::ORIGIN, 1.0).await.is_err() {
                return;
            }
            while let Ok(byte) = server.read_u8().await {
                if server.write_u8(byte.wrapping_add(1)).await.is_err() {
                    break;
                }
            }
        });
        Ok(Box::new(client))
    }
}

// =============================================================================
// TEST GROUP 1: Coordinate estimator
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_ping_measures_simulated_latency() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, fast_config(), rng(1));
    let b = TestNode::start(&network, 2, fast_config(), rng(2));
    network.set_latency(b.address(), Duration::from_millis(40));

    let sample = a.estimator.ping(b.address(), false).await.unwrap();

    assert!(sample.rtt_ms >= 40.0 && sample.rtt_ms < 41.0, "rtt {}", sample.rtt_ms);
    assert_eq!(sample.remote, Coordinate::ORIGIN);
    assert_eq!(a.estimator.coordinate(), Coordinate::ORIGIN);
    assert_eq!(a.record().epoch, 0);
}

#[tokio::test(start_paused = true)]
async fn test_ping_with_update_publishes_coordinate() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, fast_config(), rng(1));
    let b = TestNode::start(&network, 2, fast_config(), rng(2));
    network.set_latency(b.address(), Duration::from_millis(25));

    a.estimator.ping(b.address(), true).await.unwrap();

    let coordinate = a.estimator.coordinate();
    assert!(coordinate.norm() > 0.0);
    assert_eq!(a.record().coordinate, Some(coordinate));
    assert_eq!(a.record().epoch, 1);
    assert!(a.estimator.error() <= 1.0);
}

#[tokio::test]
async fn test_ping_to_down_peer_fails() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, fast_config(), rng(1));
    let b = TestNode::start(&network, 2, fast_config(), rng(2));
    network.set_down(b.address(), true);

    let result = a.estimator.ping(b.address(), true).await;

    assert!(matches!(result, Err(DiscoveryError::Transport(_))));
    assert_eq!(a.estimator.coordinate(), Coordinate::ORIGIN);
}

#[tokio::test]
async fn test_mismatched_echo_fails_ping() {
    let local = Arc::new(LocalNode::new(crate::test_utils::make_record(1)));
    let estimator = CoordinateEstimator::new(
        local,
        Arc::new(CorruptEchoTransport),
        rng(1),
        4,
        Duration::from_secs(1),
    );

    let result = estimator.ping(make_address(2), true).await;

    assert!(matches!(
        result,
        Err(DiscoveryError::EchoMismatch { sent: 0, received: 1 })
    ));
    assert_eq!(estimator.coordinate(), Coordinate::ORIGIN);
}

#[tokio::test]
async fn test_echo_responder_tolerates_early_hangup() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, DiscoveryConfig::for_testing(), rng(1));
    let (mut client, server) = tokio::io::duplex(1024);

    let responder = tokio::spawn({
        let estimator = Arc::clone(&a.estimator);
        async move { estimator.handle_connection(Box::new(server)).await }
    });
    let mut coordinate = [0u8; crate::wire::COORDINATE_WIRE_LEN];
    client.read_exact(&mut coordinate).await.unwrap();
    client.write_u8(0).await.unwrap();
    assert_eq!(client.read_u8().await.unwrap(), 0);
    drop(client);

    assert!(responder.await.unwrap().is_ok());
}

// =============================================================================
// TEST GROUP 2: Node info and dispatch
// =============================================================================

#[tokio::test]
async fn test_node_info_returns_current_record() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, fast_config(), rng(1));
    let b = TestNode::start(&network, 2, fast_config(), rng(2));
    b.local.publish_coordinate(Coordinate::new([1.0, 2.0, 3.0]));

    let record = request_node_info(
        &network.transport(),
        b.address(),
        Duration::from_secs(1),
        a.config.max_message_bytes,
    )
    .await
    .unwrap();

    assert_eq!(record, b.record());
    assert_eq!(record.epoch, 1);
}

#[tokio::test]
async fn test_node_info_rejects_unknown_opcode() {
    let local = Arc::new(LocalNode::new(crate::test_utils::make_record(1)));
    let service = NodeInfoService::new(local, 1024, Duration::from_secs(1));
    let (mut client, server) = tokio::io::duplex(64);
    client.write_u8(0x09).await.unwrap();

    let result = service.handle_connection(Box::new(server)).await;

    assert!(matches!(
        result,
        Err(DiscoveryError::Wire(WireError::UnknownOpcode(0x09)))
    ));
}

#[tokio::test]
async fn test_dispatcher_drops_unknown_service_tag() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, fast_config(), rng(1));
    let dispatcher = dispatcher_for(&a);
    let (mut client, server) = tokio::io::duplex(64);
    client.write_u8(0x55).await.unwrap();

    let result = dispatcher.accept(Box::new(server)).await;

    assert!(matches!(
        result,
        Err(DiscoveryError::Wire(WireError::UnknownService(0x55)))
    ));
}

#[tokio::test]
async fn test_oversized_gossip_request_gets_no_reply() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, fast_config(), rng(1));
    let (mut client, server) = tokio::io::duplex(64);
    client.write_u32(u32::MAX).await.unwrap();

    let result = a.gossip.handle_connection(Box::new(server)).await;

    assert!(matches!(
        result,
        Err(DiscoveryError::Wire(WireError::MessageTooLarge { .. }))
    ));
    let mut buf = Vec::new();
    client.read_to_end(&mut buf).await.unwrap();
    assert!(buf.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dispatcher_drops_client_that_never_sends_a_tag() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, fast_config(), rng(1));
    let dispatcher = dispatcher_for(&a);
    let (_client, server) = tokio::io::duplex(64);
    let started = tokio::time::Instant::now();

    let result = within_an_hour(dispatcher.accept(Box::new(server))).await;

    assert!(matches!(result, Err(DiscoveryError::Timeout(_))));
    assert!(started.elapsed() >= a.config.connect_timeout());
}

#[tokio::test(start_paused = true)]
async fn test_dispatcher_bounds_handler_after_tag() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, fast_config(), rng(1));
    let dispatcher = dispatcher_for(&a);
    let (mut client, server) = tokio::io::duplex(64);
    client.write_u8(ServiceTag::NodeInfo.as_byte()).await.unwrap();

    let result = within_an_hour(dispatcher.accept(Box::new(server))).await;

    assert!(matches!(result, Err(DiscoveryError::Timeout(_))));
}

#[tokio::test(start_paused = true)]
async fn test_gossip_responder_drops_stalled_request() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, fast_config(), rng(1));
    let (mut client, server) = tokio::io::duplex(1024);
    // Length prefix promises a body that never arrives
    client.write_u32(100).await.unwrap();

    let result = within_an_hour(a.gossip.handle_connection(Box::new(server))).await;

    assert!(matches!(result, Err(DiscoveryError::Timeout(_))));
    assert!(a.gossip.get_nodes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_echo_responder_drops_silent_requester() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, fast_config(), rng(1));
    let (_client, server) = tokio::io::duplex(1024);

    let result = within_an_hour(a.estimator.handle_connection(Box::new(server))).await;

    assert!(matches!(result, Err(DiscoveryError::Timeout(_))));
}

#[tokio::test(start_paused = true)]
async fn test_node_info_responder_drops_silent_requester() {
    let local = Arc::new(LocalNode::new(crate::test_utils::make_record(1)));
    let service = NodeInfoService::new(local, 1024, Duration::from_secs(1));
    let (_client, server) = tokio::io::duplex(64);

    let result = within_an_hour(service.handle_connection(Box::new(server))).await;

    assert!(matches!(result, Err(DiscoveryError::Timeout(_))));
}

// =============================================================================
// TEST GROUP 3: Neighbor trackers
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_tracker_leaves_probation_with_full_window() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, fast_config(), rng(1));
    let b = TestNode::start(&network, 2, fast_config(), rng(2));
    network.set_latency(b.address(), Duration::from_millis(20));

    let tracker = a.cluster.track(b.record());
    assert_eq!(tracker.distance(), Distance::Unknown);

    tokio::time::sleep(Duration::from_millis(500)).await;

    match tracker.distance() {
        Distance::Millis(ms) => assert!((20.0..21.0).contains(&ms), "distance {ms}"),
        other => panic!("expected finite distance, got {other}"),
    }
    assert_eq!(tracker.consecutive_failures(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_tracker_follows_identity_change() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, fast_config(), rng(1));
    let b = TestNode::start(&network, 2, fast_config(), rng(2));

    let stale = PeerRecord::new(make_peer_id(99), b.address(), "test");
    let tracker = a.cluster.track(stale);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(tracker.peer_id(), make_peer_id(99));
    assert_eq!(tracker.record().id, b.id());
}

#[tokio::test(start_paused = true)]
async fn test_ended_tracker_is_unreachable() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, fast_config(), rng(1));
    let b = TestNode::start(&network, 2, fast_config(), rng(2));

    let tracker = a.cluster.track(b.record());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(tracker.distance().is_finite());

    tracker.end();

    assert_eq!(tracker.distance(), Distance::Unreachable);
    assert!(tracker.is_ended());
}

// =============================================================================
// TEST GROUP 4: Cluster maintenance
// =============================================================================

#[tokio::test]
async fn test_empty_cluster_reports_unreachable_nearest() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, fast_config(), rng(1));

    assert_eq!(a.cluster.nearest_distance(), Distance::Unreachable);
    assert_eq!(a.cluster.neighbor_count(), 0);
    assert!(a.cluster.random_neighbor().is_none());
    assert_eq!(a.cluster.local_coordinate(), Coordinate::ORIGIN);
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_adds_up_to_candidate_target() {
    let network = MemoryNetwork::new();
    let config = DiscoveryConfig {
        candidate_target: 2,
        ..fast_config()
    };
    let a = TestNode::start(&network, 1, config.clone(), rng(1));
    let peers: Vec<_> = (2..=5)
        .map(|n| TestNode::start(&network, n, config.clone(), rng(n as u64)))
        .collect();
    let mut records: Vec<_> = peers.iter().map(TestNode::record).collect();
    records.push(a.record());
    seed_gossip(&a, &records);

    let report = a.cluster.maintain();

    assert_eq!(report.added.len(), 2);
    assert!(!report.added.contains(&a.id()));
    assert_eq!(a.cluster.neighbor_count(), 2);

    // Both candidates still in probation: nothing more to add
    let report = a.cluster.maintain();
    assert_eq!(report.candidates, 2);
    assert!(report.added.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_prefers_coordinate_nearest_candidates() {
    let network = MemoryNetwork::new();
    let config = DiscoveryConfig {
        candidate_target: 1,
        ..fast_config()
    };
    let a = TestNode::start(&network, 1, config.clone(), rng(1));
    let far = TestNode::start(&network, 2, config.clone(), rng(2));
    let near = TestNode::start(&network, 3, config.clone(), rng(3));
    let unknown = TestNode::start(&network, 4, config, rng(4));
    far.local.publish_coordinate(Coordinate::new([300.0, 0.0, 0.0]));
    near.local.publish_coordinate(Coordinate::new([5.0, 0.0, 0.0]));
    seed_gossip(&a, &[unknown.record(), far.record(), near.record()]);

    let report = a.cluster.maintain();

    assert_eq!(report.added, vec![near.id()]);
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_evicts_farthest_beyond_max() {
    let network = MemoryNetwork::new();
    let config = DiscoveryConfig {
        max_cluster_size: 1,
        candidate_target: 3,
        ..fast_config()
    };
    let a = TestNode::start(&network, 1, config.clone(), rng(1));
    let latencies = [(2, 10), (3, 30), (4, 50)];
    let mut records = Vec::new();
    let mut _nodes = Vec::new();
    for (n, ms) in latencies {
        let node = TestNode::start(&network, n, config.clone(), rng(n as u64));
        network.set_latency(node.address(), Duration::from_millis(ms));
        records.push(node.record());
        _nodes.push(node);
    }
    seed_gossip(&a, &records);

    let first = a.cluster.maintain();
    assert_eq!(first.added.len(), 3);

    // Long enough for every probation to finish, short of the active interval
    tokio::time::sleep(Duration::from_millis(800)).await;
    for (record, distance) in a.cluster.sorted_neighbors() {
        assert!(distance.is_finite(), "{} still {}", record.id, distance);
    }

    let report = a.cluster.maintain();

    assert_eq!(report.evicted, vec![make_peer_id(4), make_peer_id(3)]);
    assert_eq!(report.candidates, 0);
    let sorted = a.cluster.sorted_neighbors();
    assert_eq!(sorted[sorted.len() - 1].0.id, make_peer_id(2));
    assert!(a.cluster.neighbor_count() <= config.max_cluster_size + report.added.len());
    match a.cluster.nearest_distance() {
        Distance::Millis(ms) => assert!((10.0..11.0).contains(&ms)),
        other => panic!("expected finite nearest distance, got {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_maintenance_ranks_before_requested_pings_land() {
    let network = MemoryNetwork::new();
    let a = TestNode::start(&network, 1, fast_config(), rng(1));
    let b = TestNode::start(&network, 2, fast_config(), rng(2));

    let tracker = a.cluster.track(b.record());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(tracker.distance().is_finite());
    network.set_down(b.address(), true);

    let report = a.cluster.maintain();

    // The pass ranked on the samples it already had
    assert!(report.removed_unreachable.is_empty());
    assert!(report.evicted.is_empty());
    assert_eq!(tracker.consecutive_failures(), 0);

    // The requested ping runs now, well ahead of the regular interval
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(tracker.consecutive_failures(), 1);
    assert!(tracker.distance().is_finite());
}
