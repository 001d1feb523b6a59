//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → candidates resolved (static list or discovery)
//!     → RouteState.balancer.lease(candidates, request)
//!         - no_balancer.rs (always the first candidate)
//!         - round_robin.rs (rotate through candidates)
//!         - least_connection.rs (fewest in-flight leases)
//!         - sticky.rs (cookie-pinned, round robin for new sessions)
//!     → Lease (endpoint + optional in-flight guard)
//!     → dropped when the downstream call completes, fails or is cancelled
//! ```
//!
//! # Design Decisions
//! - One balancer instance per route; state is discarded with the route on reload
//! - Balancers never block; selection is synchronous
//! - In-flight accounting is RAII so cancellation cannot leak a count

pub mod endpoint;
pub mod lease;
pub mod least_connection;
pub mod no_balancer;
pub mod round_robin;
pub mod sticky;

use std::time::Duration;

use crate::config::{LoadBalancerKind, LoadBalancerOptions};
use crate::http::request::InboundRequest;

pub use endpoint::Endpoint;
pub use lease::{ConnectionGuard, Lease};
pub use least_connection::LeastConnection;
pub use no_balancer::NoLoadBalancer;
pub use round_robin::RoundRobin;
pub use sticky::CookieStickySessions;

/// Default sticky-session cookie when none is configured.
pub const DEFAULT_STICKY_COOKIE: &str = "sessionid";

/// Endpoint selection strategy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick one of `candidates`. `None` only when `candidates` is empty.
    fn lease(&self, candidates: &[Endpoint], request: &InboundRequest) -> Option<Lease>;

    /// Drop expired bookkeeping. Most strategies keep none.
    fn purge_expired(&self) {}

    /// Leases currently held against `endpoint`, for strategies that count them.
    fn in_flight(&self, _endpoint: &Endpoint) -> usize {
        0
    }
}

/// Build the balancer a route's options ask for.
pub fn from_options(options: &LoadBalancerOptions) -> Box<dyn LoadBalancer> {
    match options.kind {
        LoadBalancerKind::NoLoadBalancer => Box::new(NoLoadBalancer),
        LoadBalancerKind::RoundRobin => Box::new(RoundRobin::new()),
        LoadBalancerKind::LeastConnection => Box::new(LeastConnection::new()),
        LoadBalancerKind::CookieStickySessions => Box::new(CookieStickySessions::new(
            options
                .key
                .clone()
                .unwrap_or_else(|| DEFAULT_STICKY_COOKIE.to_string()),
            Duration::from_millis(options.expiry_ms),
        )),
    }
}
