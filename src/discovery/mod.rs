//! Service discovery subsystem.
//!
//! # Data Flow
//! ```text
//! Resolve stage
//!     → resolver.rs (static endpoints on the route, or a service name)
//!     → ServiceDiscovery::resolve(service)
//!         - registry.rs StaticServiceDiscovery ([[services]] in config)
//!         - registry.rs InMemoryServiceDiscovery (pushed by a collaborator)
//!         - any injected implementation
//!     → candidates → load balancer
//! ```
//!
//! # Design Decisions
//! - Discovery failures and empty snapshots fail the request, never the gateway
//! - Registries hold immutable endpoint lists behind `Arc` so resolution is a clone

pub mod registry;
pub mod resolver;

use async_trait::async_trait;
use thiserror::Error;

use crate::load_balancer::Endpoint;

pub use registry::{InMemoryServiceDiscovery, StaticServiceDiscovery};
pub use resolver::DownstreamResolver;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("unknown service '{0}'")]
    UnknownService(String),

    #[error("service registry unavailable: {0}")]
    Unavailable(String),
}

/// Resolves a logical service name to its current endpoints.
#[async_trait]
pub trait ServiceDiscovery: Send + Sync + std::fmt::Debug {
    async fn resolve(&self, service: &str) -> Result<Vec<Endpoint>, DiscoveryError>;
}
