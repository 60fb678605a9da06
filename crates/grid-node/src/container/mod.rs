//! # Service Container
//!
//! Node configuration and the container holding every discovery service
//! instance with its production adapters.

pub mod config;
pub mod services;

pub use config::NodeConfig;
pub use services::DiscoveryServices;
