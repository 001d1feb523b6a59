//! Response caching subsystem.
//!
//! # Data Flow
//! ```text
//! CacheLookup stage:
//!     key.rs (method + host + path + sorted query + vary headers [+ body hash])
//!     → store.rs try_get → hit: short-circuit with the stored response
//!
//! CacheStore stage (after a downstream call):
//!     is_cacheable(method, status) → store.rs store (first writer wins)
//! ```
//!
//! # Design Decisions
//! - One store per route; region tags allow bulk invalidation across routes
//! - Entries are immutable; a live entry is never overwritten
//! - Expiry is lazy on lookup plus a periodic sweep

pub mod key;
pub mod store;

use axum::http::{Method, StatusCode};

pub use key::CacheKey;
pub use store::ResponseCache;

/// Methods and statuses whose responses are stored.
pub fn is_cacheable(method: &Method, status: StatusCode) -> bool {
    let method_ok = *method == Method::GET || *method == Method::HEAD;
    let status_ok = matches!(
        status,
        StatusCode::OK | StatusCode::NON_AUTHORITATIVE_INFORMATION | StatusCode::NO_CONTENT
    );
    method_ok && status_ok
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cacheable_matrix() {
        assert!(is_cacheable(&Method::GET, StatusCode::OK));
        assert!(is_cacheable(&Method::HEAD, StatusCode::NO_CONTENT));
        assert!(is_cacheable(&Method::GET, StatusCode::NON_AUTHORITATIVE_INFORMATION));
        assert!(!is_cacheable(&Method::POST, StatusCode::OK));
        assert!(!is_cacheable(&Method::GET, StatusCode::NOT_FOUND));
        assert!(!is_cacheable(&Method::GET, StatusCode::INTERNAL_SERVER_ERROR));
    }
}
