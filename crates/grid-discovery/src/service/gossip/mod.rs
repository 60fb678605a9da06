//! # Gossip Membership
//!
//! Epidemic exchange of peer records. Each [`GossipAlgorithm`] variant
//! runs its own [`GossipEngine`] against an independent cache;
//! [`GossipService`] fronts them for inbound requests and read queries.
//!
//! [`GossipAlgorithm`]: crate::domain::GossipAlgorithm

mod engine;
mod service;

pub use engine::{EngineContext, GossipEngine, RoundOutcome};
pub use service::GossipService;

#[cfg(test)]
mod tests;
