//! # Adapters Layer
//!
//! Concrete implementations of the outbound ports.
//!
//! - `random`: `ThreadRandomSource` (production), `FixedRandomSource` (tests)
//! - `time`: `SystemTimeSource`
//! - `config`: `StaticConfigProvider`, `TomlConfigProvider` (feature `network`)
//! - `bootstrap`: `NodeInfoBootstrap`, `StaticBootstrap`
//! - `tcp`: `TcpTransport`, `TcpAcceptor` (feature `network`)

pub mod bootstrap;
pub mod config;
pub mod random;
pub mod time;

#[cfg(feature = "network")]
pub mod tcp;

pub use bootstrap::{NodeInfoBootstrap, StaticBootstrap};
pub use config::StaticConfigProvider;
#[cfg(feature = "network")]
pub use config::TomlConfigProvider;
pub use random::{FixedRandomSource, ThreadRandomSource};
#[cfg(feature = "network")]
pub use tcp::{TcpAcceptor, TcpTransport};
pub use time::SystemTimeSource;
