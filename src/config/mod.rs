//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → GatewaySnapshot::build (route table + per-route state)
//!
//! On reload signal (file change or SIGHUP):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → Gateway::reload publishes a new snapshot atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - A rejected reload never replaces the running snapshot

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AggregateRouteConfig, CacheOptions, DynamicRouteConfig, GatewayConfig, GlobalConfig,
    ListenerConfig, LoadBalancerKind, LoadBalancerOptions, ObservabilityConfig, QosOptions,
    RateLimitOptions, RouteConfig, ServiceConfig,
};
pub use validation::{validate_config, ValidationError};
pub use watcher::{ConfigReloader, ConfigWatcher};
