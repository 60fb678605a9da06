//! # Service Container
//!
//! Holds every discovery service of one node, wired to the production
//! adapters: TCP transport, system clock, entropy-seeded RNG and the
//! node-info bootstrap.

use std::net::SocketAddr;
use std::sync::Arc;

use grid_discovery::adapters::{
    NodeInfoBootstrap, SystemTimeSource, TcpTransport, ThreadRandomSource,
};
use grid_discovery::{
    BootstrapSource, ClusterService, ConnectionDispatcher, CoordinateEstimator, EngineContext,
    GossipService, LocalNode, MembershipApi, NodeInfoService, PeerId, PeerRecord, ProximityApi,
    RandomSource, Transport,
};

use super::NodeConfig;

/// All discovery services of one node.
pub struct DiscoveryServices {
    pub local: Arc<LocalNode>,
    pub gossip: Arc<GossipService>,
    pub estimator: Arc<CoordinateEstimator>,
    pub cluster: Arc<ClusterService>,
    pub dispatcher: Arc<ConnectionDispatcher>,
}

impl DiscoveryServices {
    /// Build the services for a node reachable at `public_addr`.
    pub fn new(config: &NodeConfig, public_addr: SocketAddr) -> Self {
        let discovery = &config.discovery;
        let record = PeerRecord::new(PeerId::random(), public_addr, config.cluster_name.clone())
            .with_protocol_version(discovery.protocol_version);
        let local = Arc::new(LocalNode::new(record));

        let transport: Arc<dyn Transport> = Arc::new(TcpTransport::new());
        let random: Arc<dyn RandomSource> = Arc::new(ThreadRandomSource::new());

        let bootstrap: Option<Arc<dyn BootstrapSource>> = if config.bootstrap_nodes.is_empty() {
            None
        } else {
            Some(Arc::new(NodeInfoBootstrap::new(
                config.bootstrap_nodes.clone(),
                Arc::clone(&transport),
                Arc::clone(&random),
                discovery.connect_timeout(),
                discovery.max_message_bytes,
            )))
        };

        let ctx = EngineContext {
            local: Arc::clone(&local),
            transport: Arc::clone(&transport),
            bootstrap,
            time: Arc::new(SystemTimeSource::new()),
            random: Arc::clone(&random),
        };
        let gossip = Arc::new(GossipService::new(discovery.clone(), ctx));

        let estimator = Arc::new(CoordinateEstimator::new(
            Arc::clone(&local),
            Arc::clone(&transport),
            Arc::clone(&random),
            discovery.ping_tries,
            discovery.connect_timeout(),
        ));

        let cluster = Arc::new(ClusterService::new(
            Arc::clone(&local),
            discovery.clone(),
            Arc::clone(&estimator),
            Arc::clone(&gossip) as Arc<dyn MembershipApi>,
            transport,
            random,
        ));

        let node_info = Arc::new(NodeInfoService::new(
            Arc::clone(&local),
            discovery.max_message_bytes,
            discovery.connect_timeout(),
        ));
        let dispatcher = Arc::new(ConnectionDispatcher::new(
            Arc::clone(&gossip),
            Arc::clone(&estimator),
            node_info,
            discovery.connect_timeout(),
        ));

        Self {
            local,
            gossip,
            estimator,
            cluster,
            dispatcher,
        }
    }

    pub fn local_id(&self) -> PeerId {
        self.local.id()
    }

    pub fn membership(&self) -> Arc<dyn MembershipApi> {
        Arc::clone(&self.gossip) as Arc<dyn MembershipApi>
    }

    pub fn proximity(&self) -> Arc<dyn ProximityApi> {
        Arc::clone(&self.cluster) as Arc<dyn ProximityApi>
    }
}
