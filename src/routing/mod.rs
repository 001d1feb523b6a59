//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, host, path, headers)
//!     → table.rs (ordered scan over routes and aggregates)
//!     → matcher.rs (method, host, header conditions)
//!     → template.rs (path match, placeholder capture)
//!     → RouteMatch or dynamic route or RouteNotFound
//!
//! Route Compilation (per configuration snapshot):
//!     RouteConfig[] + AggregateRouteConfig[]
//!     → route.rs (compile templates, policies, transforms)
//!     → Sort by priority, specificity, declaration order
//!     → Freeze as immutable RouteTable
//!
//! Downstream:
//!     downstream.rs (render path and query, build the endpoint URL)
//! ```
//!
//! # Design Decisions
//! - Routes compiled once per snapshot, immutable at runtime
//! - No regex in hot path (segment comparison only)
//! - Deterministic: same input always matches same route
//! - First match wins

pub mod downstream;
pub mod matcher;
pub mod route;
pub mod table;
pub mod template;

pub use route::{AggregateRoute, Route, RouteBuildError, RouteId};
pub use table::{RouteMatch, RouteTable, RouteTarget};
pub use template::{Placeholders, UpstreamTemplate};
