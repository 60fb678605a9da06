//! TCP transport and accept loop (requires "network" feature).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::TransportError;
use crate::ports::{Connection, Transport};
use crate::service::ConnectionDispatcher;
use crate::wire::ServiceTag;

// ============================================================================
// TcpTransport - Outbound connections
// ============================================================================

/// Opens one TCP connection per exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl TcpTransport {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(
        &self,
        addr: SocketAddr,
        tag: ServiceTag,
        timeout: Duration,
    ) -> Result<Connection, TransportError> {
        let mut stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::Timeout { addr })?
            .map_err(|e| TransportError::ConnectFailed {
                addr,
                reason: e.to_string(),
            })?;
        // Echo rounds are single bytes; Nagle would inflate every sample
        stream.set_nodelay(true)?;
        stream.write_u8(tag.as_byte()).await?;
        Ok(Box::new(stream))
    }
}

// ============================================================================
// TcpAcceptor - Inbound connections
// ============================================================================

/// Accept loop handing every connection to the dispatcher on its own task.
pub struct TcpAcceptor {
    listener: TcpListener,
    dispatcher: Arc<ConnectionDispatcher>,
}

impl TcpAcceptor {
    /// Bind to `addr` (port 0 picks a free port).
    pub async fn bind(
        addr: SocketAddr,
        dispatcher: Arc<ConnectionDispatcher>,
    ) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self::from_listener(listener, dispatcher))
    }

    /// Wrap an already bound listener.
    #[must_use]
    pub fn from_listener(listener: TcpListener, dispatcher: Arc<ConnectionDispatcher>) -> Self {
        Self {
            listener,
            dispatcher,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until `shutdown` fires.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(addr = ?self.listener.local_addr().ok(), "Accepting connections");
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        if let Err(e) = stream.set_nodelay(true) {
                            debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
                        }
                        let dispatcher = Arc::clone(&self.dispatcher);
                        tokio::spawn(async move {
                            if let Err(e) = dispatcher.accept(Box::new(stream)).await {
                                debug!(%peer, error = %e, "Inbound connection closed with error");
                            }
                        });
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
                _ = shutdown.changed() => break,
            }
        }
        info!("Acceptor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ThreadRandomSource;
    use crate::domain::DiscoveryConfig;
    use crate::service::{
        request_node_info, CoordinateEstimator, EngineContext, GossipService, LocalNode,
        NodeInfoService,
    };
    use crate::test_utils::make_record;

    fn loopback_dispatcher(local: Arc<LocalNode>) -> Arc<ConnectionDispatcher> {
        let config = DiscoveryConfig::for_testing();
        let transport: Arc<dyn Transport> = Arc::new(TcpTransport::new());
        let random = Arc::new(ThreadRandomSource::from_seed(1));
        let ctx = EngineContext {
            local: Arc::clone(&local),
            transport: Arc::clone(&transport),
            bootstrap: None,
            time: Arc::new(crate::adapters::SystemTimeSource::new()),
            random: random.clone(),
        };
        Arc::new(ConnectionDispatcher::new(
            Arc::new(GossipService::new(config.clone(), ctx)),
            Arc::new(CoordinateEstimator::new(
                Arc::clone(&local),
                transport,
                random,
                config.ping_tries,
                config.connect_timeout(),
            )),
            Arc::new(NodeInfoService::new(
                local,
                config.max_message_bytes,
                config.connect_timeout(),
            )),
            config.connect_timeout(),
        ))
    }

    #[tokio::test]
    async fn test_node_info_over_loopback() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let mut record = make_record(1);
        record.address = addr;
        let local = Arc::new(LocalNode::new(record.clone()));
        let acceptor = TcpAcceptor::from_listener(listener, loopback_dispatcher(local));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(acceptor.run(shutdown_rx));

        let fetched = request_node_info(&TcpTransport::new(), addr, Duration::from_secs(2), 1024)
            .await
            .unwrap();

        assert_eq!(fetched, record);
        shutdown_tx.send_replace(true);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_to_closed_port_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = TcpTransport::new()
            .connect(addr, ServiceTag::NodeInfo, Duration::from_secs(1))
            .await;

        assert!(result.is_err());
    }
}
