//! # Node Configuration
//!
//! One TOML file configures the whole node. The `[node]` table carries the
//! runtime settings read here; the discovery tables (`[gossip]`,
//! `[vivaldi]`, `[cluster]`, `[bootstrap]`) and the remaining `[node]`
//! keys are handed to [`TomlConfigProvider`].
//!
//! ```toml
//! [node]
//! listen_addr = "0.0.0.0:7946"
//! public_addr = "203.0.113.7:7946"
//! cluster_name = "grid"
//! stats_interval_ms = 15000
//!
//! [bootstrap]
//! nodes = ["198.51.100.1:7946"]
//! ```

use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use grid_discovery::adapters::TomlConfigProvider;
use grid_discovery::{ConfigError, ConfigProvider, DiscoveryConfig};
use serde::Deserialize;

/// Default listening address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:7946";

/// Complete node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address the TCP listener binds to.
    pub listen_addr: SocketAddr,
    /// Address other nodes should dial; defaults to the bound address.
    pub public_addr: Option<SocketAddr>,
    /// Cluster name published in the local record.
    pub cluster_name: String,
    /// Period of the metrics reporter.
    pub stats_interval_ms: u64,
    /// Well-known addresses asked for a first peer.
    pub bootstrap_nodes: Vec<SocketAddr>,
    /// Discovery tunables.
    pub discovery: DiscoveryConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 7946)),
            public_addr: None,
            cluster_name: "grid".to_string(),
            stats_interval_ms: 15_000,
            bootstrap_nodes: Vec::new(),
            discovery: DiscoveryConfig::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct NodeFile {
    #[serde(default)]
    node: NodeSection,
}

#[derive(Debug, Default, Deserialize)]
struct NodeSection {
    listen_addr: Option<String>,
    public_addr: Option<String>,
    cluster_name: Option<String>,
    stats_interval_ms: Option<u64>,
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("{value}: {e}"),
    })
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string; missing keys keep defaults.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let file: NodeFile =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let provider = TomlConfigProvider::parse(content)?;
        let defaults = Self::default();
        let node = file.node;

        let config = Self {
            listen_addr: match node.listen_addr {
                Some(addr) => parse_addr("node.listen_addr", &addr)?,
                None => defaults.listen_addr,
            },
            public_addr: node
                .public_addr
                .map(|addr| parse_addr("node.public_addr", &addr))
                .transpose()?,
            cluster_name: node.cluster_name.unwrap_or(defaults.cluster_name),
            stats_interval_ms: node.stats_interval_ms.unwrap_or(defaults.stats_interval_ms),
            bootstrap_nodes: provider.get_bootstrap_nodes(),
            discovery: provider.get_discovery_config(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Check node-level values; discovery values are checked on parse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster_name.is_empty() {
            return Err(ConfigError::Invalid {
                field: "node.cluster_name",
                reason: "must not be empty".into(),
            });
        }
        if self.stats_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "node.stats_interval_ms",
                reason: "must be positive".into(),
            });
        }
        self.discovery.validate()
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }
}
