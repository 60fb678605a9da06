//! # Ports Layer - Hexagonal Architecture Boundaries
//!
//! - **Driving Ports (Inbound):** membership and proximity views this
//!   subsystem exposes
//! - **Driven Ports (Outbound):** transport, clock, randomness, bootstrap
//!   and config this subsystem requires

pub mod inbound;
pub mod outbound;

pub use inbound::{MembershipApi, ProximityApi};
pub use outbound::{
    AsyncStream, BootstrapSource, ConfigProvider, Connection, RandomSource, TimeSource, Transport,
};
