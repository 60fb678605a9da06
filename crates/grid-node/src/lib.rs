//! # Grid Node Library
//!
//! Exposes the node's building blocks for the binary and for tests.
//!
//! - `container/` - configuration and the discovery service container
//! - `runtime` - startup, background loops and graceful shutdown
//! - `reporter` - periodic metrics snapshots

pub mod container;
pub mod reporter;
pub mod runtime;

pub use container::{DiscoveryServices, NodeConfig};
pub use runtime::NodeRuntime;
