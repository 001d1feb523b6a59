//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Send stage
//!     → qos.rs guarded_call
//!         → circuit_breaker.rs try_acquire (fail fast when open)
//!         → timeouts.rs with_timeout(transport.send)
//!         → permit.record_success / record_failure
//!     → DownstreamResponse | CircuitOpen | DownstreamTimeout | DownstreamTransport
//! ```
//!
//! # Design Decisions
//! - Breakers are per route, never shared through a host or a global registry
//! - Only transport failures and timeouts trip a breaker
//! - No retries: a failed call is reported, not replayed

pub mod circuit_breaker;
pub mod qos;
pub mod timeouts;

pub use circuit_breaker::{BreakerSettings, CircuitBreaker, CircuitState};
pub use qos::{guarded_call, QosPolicy};
pub use timeouts::{deadline, DEFAULT_TIMEOUT};
