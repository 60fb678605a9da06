//! # Node Runtime
//!
//! ## Startup Sequence
//!
//! 1. Bind the TCP listener (the bound address becomes the public address
//!    unless one is configured)
//! 2. Build the discovery services around the local record
//! 3. Spawn the accept loop, one gossip loop per variant, the Vivaldi
//!    loop, cluster maintenance and the stats reporter
//!
//! Every loop watches the same shutdown channel.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use grid_discovery::adapters::TcpAcceptor;
use grid_discovery::PeerId;
use grid_telemetry::log_peer_event;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::container::{DiscoveryServices, NodeConfig};
use crate::reporter::run_reporter;

/// Time allowed for loops to wind down after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// A running node.
pub struct NodeRuntime {
    services: Arc<DiscoveryServices>,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeRuntime {
    /// Bind, build and spawn everything.
    pub async fn start(config: NodeConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
        let bound = listener
            .local_addr()
            .context("Failed to read bound address")?;
        let local_addr = config.public_addr.unwrap_or(bound);

        let services = Arc::new(DiscoveryServices::new(&config, local_addr));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let acceptor = TcpAcceptor::from_listener(listener, Arc::clone(&services.dispatcher));
        let mut tasks = vec![tokio::spawn(acceptor.run(shutdown_rx.clone()))];
        tasks.extend(services.gossip.spawn_loops(&shutdown_rx));
        tasks.push(tokio::spawn(Arc::clone(&services.estimator).run(
            services.proximity(),
            services.membership(),
            config.discovery.vivaldi_interval(),
            shutdown_rx.clone(),
        )));
        tasks.push(tokio::spawn(
            Arc::clone(&services.cluster).run(shutdown_rx.clone()),
        ));
        tasks.push(tokio::spawn(run_reporter(
            Arc::clone(&services),
            config.stats_interval(),
            shutdown_rx,
        )));

        log_peer_event!(
            info,
            "runtime",
            "Node started",
            services.local_id(),
            %bound,
            public = %local_addr,
            cluster = %config.cluster_name,
            bootstrap_nodes = config.bootstrap_nodes.len()
        );

        Ok(Self {
            services,
            local_addr,
            shutdown_tx,
            tasks,
        })
    }

    pub fn local_id(&self) -> PeerId {
        self.services.local_id()
    }

    /// Address published in the local record.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn services(&self) -> Arc<DiscoveryServices> {
        Arc::clone(&self.services)
    }

    /// Signal every loop and wait for them, at most [`SHUTDOWN_GRACE`].
    pub async fn shutdown(self) {
        info!("Initiating graceful shutdown...");
        self.shutdown_tx.send_replace(true);

        let tasks = self.tasks;
        let joined = tokio::time::timeout(SHUTDOWN_GRACE, async move {
            for task in tasks {
                let _ = task.await;
            }
        })
        .await;
        if joined.is_err() {
            warn!("Some loops did not stop within the grace period");
        }
        self.services.cluster.shutdown();
        info!("Shutdown complete");
    }
}
