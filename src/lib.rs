//! API gateway core library.
//!
//! Matches inbound requests against a compiled route table, applies per-route
//! policies (rate limiting, caching, load balancing, circuit breaking,
//! timeouts) and forwards them downstream, or fans out to several routes and
//! merges the answers.

// Core subsystems
pub mod config;
pub mod gateway;
pub mod http;
pub mod pipeline;
pub mod routing;
pub mod transport;

// Traffic management
pub mod cache;
pub mod discovery;
pub mod load_balancer;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use gateway::{Gateway, GatewayBuilder};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
