//! Request dispatch pipeline.
//!
//! # Data Flow
//! ```text
//! Gateway::handle(InboundRequest)
//!     → RouteTable::resolve → RouteMatch
//!     → dispatcher.rs
//!         Route:     context.rs RequestContext → stages → DownstreamResponse
//!         Aggregate: spawn one stage run per member → join_all
//!                    → aggregator.rs ResponseAggregator::aggregate
//!     → state.rs RouteState (limiter, balancer, breaker, cache) per route
//!     → transform.rs (header, claim and query rewrites)
//! ```
//!
//! # Design Decisions
//! - Stages are an explicit ordered list; short-circuits are visible in one place
//! - Per-route state lives in a registry built with the snapshot, never in globals
//! - Aggregate members run as real tasks and are aborted if the caller goes away

pub mod aggregator;
pub mod context;
pub mod dispatcher;
pub mod state;
pub mod transform;

pub use aggregator::{AggregatePart, AggregatorRegistry, ResponseAggregator, SimpleJsonAggregator};
pub use context::{RequestContext, ResolvedRoute};
pub use dispatcher::{Dispatcher, Flow, Stage};
pub use state::{RouteState, RouteStateRegistry};
