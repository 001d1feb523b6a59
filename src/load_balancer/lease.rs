//! Endpoint leases.
//!
//! # Responsibilities
//! - Hand the selected endpoint to the pipeline
//! - Track in-flight requests per endpoint (for LeastConnection)
//! - Release the in-flight count on completion, failure or cancellation

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::Endpoint;

/// A RAII guard that manages an endpoint's in-flight count.
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    /// Increment `active` and return a guard that decrements it on drop.
    pub fn acquire(active: Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        Self { active }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// The endpoint chosen for one downstream call.
#[derive(Debug)]
pub struct Lease {
    endpoint: Endpoint,
    _guard: Option<ConnectionGuard>,
}

impl Lease {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            _guard: None,
        }
    }

    pub fn guarded(endpoint: Endpoint, guard: ConnectionGuard) -> Self {
        Self {
            endpoint,
            _guard: Some(guard),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Deref for Lease {
    type Target = Endpoint;
    fn deref(&self) -> &Self::Target {
        &self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_releases_on_drop() {
        let active = Arc::new(AtomicUsize::new(0));
        let lease = Lease::guarded(
            Endpoint::new("a", 1),
            ConnectionGuard::acquire(active.clone()),
        );
        assert_eq!(active.load(Ordering::Acquire), 1);
        assert_eq!(lease.authority(), "a:1");

        drop(lease);
        assert_eq!(active.load(Ordering::Acquire), 0);
    }
}
