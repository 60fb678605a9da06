use std::net::SocketAddr;

use crate::domain::DiscoveryConfig;
use crate::ports::ConfigProvider;

// ============================================================================
// StaticConfigProvider - Hardcoded config for testing/development
// ============================================================================

/// Static configuration provider with hardcoded values.
///
/// Useful for testing and development. For production, use `TomlConfigProvider`.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    bootstrap_nodes: Vec<SocketAddr>,
    config: DiscoveryConfig,
}

impl StaticConfigProvider {
    /// Default config and no bootstrap nodes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_bootstrap_nodes(mut self, nodes: Vec<SocketAddr>) -> Self {
        self.bootstrap_nodes = nodes;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: DiscoveryConfig) -> Self {
        self.config = config;
        self
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn get_bootstrap_nodes(&self) -> Vec<SocketAddr> {
        self.bootstrap_nodes.clone()
    }

    fn get_discovery_config(&self) -> DiscoveryConfig {
        self.config.clone()
    }
}

// ============================================================================
// TomlConfigProvider - Production Config Loading (requires "network" feature)
// ============================================================================

#[cfg(feature = "network")]
mod toml_config {
    use super::*;
    use crate::domain::{ConfigError, DistanceMode, GossipAlgorithm};
    use serde::Deserialize;
    use std::fs;
    use std::path::Path;

    /// Configuration file structure.
    ///
    /// Unknown tables and keys are ignored so the node binary can keep
    /// its own settings in the same file.
    #[derive(Debug, Deserialize, Default)]
    struct ConfigFile {
        #[serde(default)]
        node: NodeSection,
        #[serde(default)]
        gossip: GossipSection,
        #[serde(default)]
        vivaldi: VivaldiSection,
        #[serde(default)]
        cluster: ClusterSection,
        #[serde(default)]
        bootstrap: BootstrapSection,
    }

    #[derive(Debug, Deserialize, Default)]
    struct NodeSection {
        connect_timeout_ms: Option<u64>,
        max_message_bytes: Option<usize>,
        protocol_version: Option<u32>,
    }

    #[derive(Debug, Deserialize, Default)]
    struct GossipSection {
        cache_size: Option<usize>,
        fallback_cache_size: Option<usize>,
        send_size: Option<usize>,
        interval_ms: Option<u64>,
        retry: Option<bool>,
        entry_ttl_ms: Option<u64>,
        algorithms: Option<Vec<GossipAlgorithm>>,
    }

    #[derive(Debug, Deserialize, Default)]
    struct VivaldiSection {
        ping_tries: Option<usize>,
        interval_ms: Option<u64>,
    }

    #[derive(Debug, Deserialize, Default)]
    struct ClusterSection {
        max_size: Option<usize>,
        candidate_target: Option<usize>,
        interval_ms: Option<u64>,
        neighbor_ping_interval_ms: Option<u64>,
        sample_window: Option<usize>,
        max_ping_failures: Option<u32>,
        distance_mode: Option<DistanceMode>,
    }

    #[derive(Debug, Deserialize, Default)]
    struct BootstrapSection {
        #[serde(default)]
        nodes: Vec<String>,
        window_ms: Option<u64>,
    }

    /// TOML-based configuration provider.
    ///
    /// # Config File Format
    ///
    /// ```toml
    /// [node]
    /// connect_timeout_ms = 10000
    ///
    /// [gossip]
    /// cache_size = 30
    /// send_size = 10
    /// interval_ms = 10000
    /// algorithms = ["arrg", "cyclon"]
    ///
    /// [vivaldi]
    /// ping_tries = 4
    ///
    /// [cluster]
    /// max_size = 10
    /// distance_mode = "min"
    ///
    /// [bootstrap]
    /// nodes = ["192.168.1.100:7946"]
    /// window_ms = 600000
    /// ```
    #[derive(Debug, Clone)]
    pub struct TomlConfigProvider {
        bootstrap_nodes: Vec<SocketAddr>,
        config: DiscoveryConfig,
    }

    impl TomlConfigProvider {
        /// Load configuration from a TOML file.
        ///
        /// # Errors
        ///
        /// Returns error if the file cannot be read, parsed or validated.
        pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
            let content = fs::read_to_string(path.as_ref())?;
            Self::parse(&content)
        }

        /// Parse configuration from a TOML string.
        ///
        /// Missing keys fall back to [`DiscoveryConfig::default`].
        pub fn parse(content: &str) -> Result<Self, ConfigError> {
            let file: ConfigFile =
                toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

            let bootstrap_nodes = file
                .bootstrap
                .nodes
                .iter()
                .map(|node| {
                    node.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
                        field: "bootstrap.nodes",
                        reason: format!("{node}: {e}"),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            let d = DiscoveryConfig::default();
            let (n, g, v, c) = (file.node, file.gossip, file.vivaldi, file.cluster);
            let config = DiscoveryConfig {
                cache_size: g.cache_size.unwrap_or(d.cache_size),
                fallback_cache_size: g.fallback_cache_size.unwrap_or(d.fallback_cache_size),
                send_size: g.send_size.unwrap_or(d.send_size),
                gossip_interval_ms: g.interval_ms.unwrap_or(d.gossip_interval_ms),
                gossip_retry: g.retry.unwrap_or(d.gossip_retry),
                bootstrap_window_ms: file.bootstrap.window_ms.unwrap_or(d.bootstrap_window_ms),
                entry_ttl_ms: g.entry_ttl_ms.unwrap_or(d.entry_ttl_ms),
                algorithms: g.algorithms.unwrap_or(d.algorithms),
                ping_tries: v.ping_tries.unwrap_or(d.ping_tries),
                vivaldi_interval_ms: v.interval_ms.unwrap_or(d.vivaldi_interval_ms),
                max_cluster_size: c.max_size.unwrap_or(d.max_cluster_size),
                candidate_target: c.candidate_target.unwrap_or(d.candidate_target),
                cluster_interval_ms: c.interval_ms.unwrap_or(d.cluster_interval_ms),
                neighbor_ping_interval_ms: c
                    .neighbor_ping_interval_ms
                    .unwrap_or(d.neighbor_ping_interval_ms),
                sample_window: c.sample_window.unwrap_or(d.sample_window),
                max_ping_failures: c.max_ping_failures.unwrap_or(d.max_ping_failures),
                distance_mode: c.distance_mode.unwrap_or(d.distance_mode),
                connect_timeout_ms: n.connect_timeout_ms.unwrap_or(d.connect_timeout_ms),
                max_message_bytes: n.max_message_bytes.unwrap_or(d.max_message_bytes),
                protocol_version: n.protocol_version.unwrap_or(d.protocol_version),
            };
            config.validate()?;

            Ok(Self {
                bootstrap_nodes,
                config,
            })
        }
    }

    impl ConfigProvider for TomlConfigProvider {
        fn get_bootstrap_nodes(&self) -> Vec<SocketAddr> {
            self.bootstrap_nodes.clone()
        }

        fn get_discovery_config(&self) -> DiscoveryConfig {
            self.config.clone()
        }
    }
}

#[cfg(feature = "network")]
pub use toml_config::TomlConfigProvider;
