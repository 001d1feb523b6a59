//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! RateLimit stage:
//!     → rate_limit.rs (per-route, per-client fixed window)
//!
//! BuildRequest / Send stages:
//!     → headers.rs (strip hop-by-hop, add X-Forwarded-*)
//! ```
//!
//! # Design Decisions
//! - Rejections happen before any downstream work is done
//! - No trust in client input: forwarding headers are appended, never replaced

pub mod headers;
pub mod rate_limit;
