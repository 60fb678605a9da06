//! Value Objects for Grid Discovery
//!
//! Distances with sentinels, gossip variant policies, and the tunables
//! every service reads.

use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::ConfigError;

/// Wire protocol version spoken by this build.
///
/// Cache sweeps drop records advertising any other version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Estimated distance to a peer, in milliseconds of round-trip time.
///
/// Total order: `Unknown < Millis(_) < Unreachable`, so a plain sort puts
/// candidates still under measurement first and dead peers last.
#[derive(Debug, Clone, Copy)]
pub enum Distance {
    /// Not enough samples yet (behaves like negative infinity).
    Unknown,
    /// Finite estimate.
    Millis(f64),
    /// Confirmed unreachable or retired (behaves like positive infinity).
    Unreachable,
}

impl Distance {
    /// Map a raw float onto the sentinel scheme.
    ///
    /// `+inf` becomes `Unreachable`; `-inf` and NaN become `Unknown`.
    pub fn from_millis(value: f64) -> Self {
        if value.is_nan() || value == f64::NEG_INFINITY {
            Self::Unknown
        } else if value == f64::INFINITY {
            Self::Unreachable
        } else {
            Self::Millis(value)
        }
    }

    /// Float view with infinities for the sentinels.
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Unknown => f64::NEG_INFINITY,
            Self::Millis(ms) => *ms,
            Self::Unreachable => f64::INFINITY,
        }
    }

    pub fn is_finite(&self) -> bool {
        matches!(self, Self::Millis(_))
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable)
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Unknown => 0,
            Self::Millis(_) => 1,
            Self::Unreachable => 2,
        }
    }
}

impl Ord for Distance {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Millis(a), Self::Millis(b)) => a.total_cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl PartialOrd for Distance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Distance {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Distance {}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Millis(ms) => write!(f, "{:.2}ms", ms),
            Self::Unreachable => write!(f, "unreachable"),
        }
    }
}

/// How a neighbor's sample window collapses into one distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMode {
    /// Smallest sample; least affected by queuing delay.
    #[default]
    Min,
    /// Arithmetic mean of the window.
    Mean,
}

/// Victim selection when a cache grows past its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// Uniformly random victim.
    Random,
    /// Entry with the highest `age`.
    Oldest,
}

/// Closed set of gossip protocol variants.
///
/// Variants share one exchange engine and differ only in their
/// [`GossipPolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GossipAlgorithm {
    /// Actualized Robust Random Gossiping: random eviction plus a
    /// fallback cache of peers that answered before.
    Arrg,
    /// Cyclon-style shuffling: gossips with its oldest entry, age-based
    /// eviction, no fallback.
    Cyclon,
}

/// How a round picks the peer it gossips with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSelection {
    /// Uniformly random cached peer.
    Random,
    /// Cached peer with the highest `age`.
    Oldest,
}

/// Behavioral knobs that distinguish gossip variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GossipPolicy {
    pub selection: TargetSelection,
    pub eviction: EvictionPolicy,
    /// Maintain a fallback cache of successful partners and retry through it.
    pub use_fallback: bool,
}

impl GossipAlgorithm {
    /// Every known variant, in startup order.
    pub const ALL: [GossipAlgorithm; 2] = [GossipAlgorithm::Arrg, GossipAlgorithm::Cyclon];

    /// Name carried on the wire in `GossipMessage::algorithm`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Arrg => "arrg",
            Self::Cyclon => "cyclon",
        }
    }

    /// Resolve a wire name back to a variant.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.name() == name)
    }

    pub fn policy(&self) -> GossipPolicy {
        match self {
            Self::Arrg => GossipPolicy {
                selection: TargetSelection::Random,
                eviction: EvictionPolicy::Random,
                use_fallback: true,
            },
            Self::Cyclon => GossipPolicy {
                selection: TargetSelection::Oldest,
                eviction: EvictionPolicy::Oldest,
                use_fallback: false,
            },
        }
    }
}

impl fmt::Display for GossipAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Exchange statistics for one gossip variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GossipStats {
    pub algorithm: String,
    /// Rounds (including retries) that completed an exchange.
    pub exchanges: u64,
    /// Rounds that ended without a successful exchange.
    pub failures: u64,
    /// Exchanges attempted through the fallback cache.
    pub fallback_retries: u64,
    /// Inbound requests answered.
    pub requests_served: u64,
    /// Distinct peer ids observed in recent received payloads.
    pub network_size_estimate: usize,
    pub cache_size: usize,
    pub fallback_size: usize,
}

/// Tunables for every discovery service.
///
/// Durations are stored as milliseconds so the struct maps directly onto
/// config files; use the `*_interval()` accessors for `Duration`s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    // -- gossip --
    /// Capacity of each primary gossip cache (default: 30)
    pub cache_size: usize,
    /// Capacity of the ARRG fallback cache (default: 10)
    pub fallback_cache_size: usize,
    /// Entries per exchange payload, including the sender's own (default: 10)
    pub send_size: usize,
    /// Gossip round interval before jitter (default: 10 s)
    pub gossip_interval_ms: u64,
    /// Retry a failed exchange once through the fallback cache (default: true)
    pub gossip_retry: bool,
    /// How long after startup bootstrap peers are injected (default: 10 min)
    pub bootstrap_window_ms: u64,
    /// Lifetime of a self-advertised cache entry (default: 1 h)
    pub entry_ttl_ms: u64,
    /// Variants to run concurrently (default: ARRG and Cyclon)
    pub algorithms: Vec<GossipAlgorithm>,

    // -- vivaldi --
    /// Echo round-trips per ping (default: 4)
    pub ping_tries: usize,
    /// Interval of the coordinate refinement loop (default: 10 s)
    pub vivaldi_interval_ms: u64,

    // -- cluster --
    /// Maximum tracked neighbors with a finite distance (default: 10)
    pub max_cluster_size: usize,
    /// Candidates kept under measurement at any time (default: 3)
    pub candidate_target: usize,
    /// Maintenance pass interval (default: 30 s)
    pub cluster_interval_ms: u64,
    /// Per-neighbor ping interval once out of probation (default: 60 s)
    pub neighbor_ping_interval_ms: u64,
    /// Samples kept per neighbor (default: 5)
    pub sample_window: usize,
    /// Consecutive failures tolerated before a neighbor is unreachable (default: 5)
    pub max_ping_failures: u32,
    /// How the sample window collapses into a distance (default: min)
    pub distance_mode: DistanceMode,

    // -- transport --
    /// Connect plus exchange timeout (default: 10 s)
    pub connect_timeout_ms: u64,
    /// Largest accepted wire frame (default: 1 MiB)
    pub max_message_bytes: usize,
    /// Protocol version peers must advertise to stay cached
    pub protocol_version: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            cache_size: 30,
            fallback_cache_size: 10,
            send_size: 10,
            gossip_interval_ms: 10_000,
            gossip_retry: true,
            bootstrap_window_ms: 600_000,
            entry_ttl_ms: 3_600_000,
            algorithms: GossipAlgorithm::ALL.to_vec(),
            ping_tries: 4,
            vivaldi_interval_ms: 10_000,
            max_cluster_size: 10,
            candidate_target: 3,
            cluster_interval_ms: 30_000,
            neighbor_ping_interval_ms: 60_000,
            sample_window: 5,
            max_ping_failures: 5,
            distance_mode: DistanceMode::Min,
            connect_timeout_ms: 10_000,
            max_message_bytes: 1 << 20,
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

impl DiscoveryConfig {
    /// Create a config suitable for testing (small caches, fast loops)
    pub fn for_testing() -> Self {
        Self {
            cache_size: 5,
            fallback_cache_size: 3,
            send_size: 3,
            gossip_interval_ms: 50,
            bootstrap_window_ms: 60_000,
            entry_ttl_ms: 60_000,
            vivaldi_interval_ms: 50,
            max_cluster_size: 3,
            candidate_target: 2,
            cluster_interval_ms: 100,
            neighbor_ping_interval_ms: 100,
            connect_timeout_ms: 1_000,
            max_message_bytes: 64 * 1024,
            ..Self::default()
        }
    }

    /// Reject values the services cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive: [(&'static str, usize); 4] = [
            ("cache_size", self.cache_size),
            ("send_size", self.send_size),
            ("sample_window", self.sample_window),
            ("max_cluster_size", self.max_cluster_size),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be at least 1".into(),
                });
            }
        }
        if self.ping_tries == 0 || self.ping_tries > u8::MAX as usize + 1 {
            return Err(ConfigError::Invalid {
                field: "ping_tries",
                reason: format!("{} is outside 1..=256", self.ping_tries),
            });
        }
        if self.algorithms.is_empty() {
            return Err(ConfigError::Invalid {
                field: "algorithms",
                reason: "at least one gossip algorithm is required".into(),
            });
        }
        if self.gossip_interval_ms == 0
            || self.vivaldi_interval_ms == 0
            || self.cluster_interval_ms == 0
        {
            return Err(ConfigError::Invalid {
                field: "interval",
                reason: "loop intervals must be non-zero".into(),
            });
        }
        Ok(())
    }

    pub fn gossip_interval(&self) -> Duration {
        Duration::from_millis(self.gossip_interval_ms)
    }

    pub fn vivaldi_interval(&self) -> Duration {
        Duration::from_millis(self.vivaldi_interval_ms)
    }

    pub fn cluster_interval(&self) -> Duration {
        Duration::from_millis(self.cluster_interval_ms)
    }

    pub fn neighbor_ping_interval(&self) -> Duration {
        Duration::from_millis(self.neighbor_ping_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
