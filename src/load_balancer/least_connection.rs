//! Least connections load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::http::request::InboundRequest;
use crate::load_balancer::{ConnectionGuard, Endpoint, Lease, LoadBalancer};

#[derive(Debug)]
struct Tracked {
    endpoint: Endpoint,
    active: Arc<AtomicUsize>,
}

/// Least connections selector.
/// Selects the candidate with the fewest leases currently in flight.
#[derive(Debug, Default)]
pub struct LeastConnection {
    tracked: Mutex<Vec<Tracked>>,
}

impl LeastConnection {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancer for LeastConnection {
    fn lease(&self, candidates: &[Endpoint], _request: &InboundRequest) -> Option<Lease> {
        if candidates.is_empty() {
            return None;
        }

        // Selection and increment happen under one lock so two callers
        // cannot both see the same minimum.
        let mut tracked = self.tracked.lock();

        // Endpoints that left the candidate set are forgotten; their
        // outstanding guards keep their own counters alive.
        tracked.retain(|t| candidates.contains(&t.endpoint));
        for candidate in candidates {
            if !tracked.iter().any(|t| &t.endpoint == candidate) {
                tracked.push(Tracked {
                    endpoint: candidate.clone(),
                    active: Arc::new(AtomicUsize::new(0)),
                });
            }
        }

        // In case of tie, the first candidate is selected (stability)
        let chosen = candidates
            .iter()
            .filter_map(|c| tracked.iter().find(|t| &t.endpoint == c))
            .min_by_key(|t| t.active.load(Ordering::Acquire))?;

        Some(Lease::guarded(
            chosen.endpoint.clone(),
            ConnectionGuard::acquire(chosen.active.clone()),
        ))
    }

    /// 0 if never leased.
    fn in_flight(&self, endpoint: &Endpoint) -> usize {
        self.tracked
            .lock()
            .iter()
            .find(|t| &t.endpoint == endpoint)
            .map(|t| t.active.load(Ordering::Acquire))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_least_conn() {
        let lb = LeastConnection::new();
        let b1 = Endpoint::new("127.0.0.1", 8080);
        let b2 = Endpoint::new("127.0.0.1", 8081);
        let candidates = vec![b1.clone(), b2.clone()];
        let req = InboundRequest::get("/");

        // Tie: first candidate
        let first = lb.lease(&candidates, &req).unwrap();
        assert_eq!(*first, b1);

        // b1 busy → b2
        let second = lb.lease(&candidates, &req).unwrap();
        assert_eq!(*second, b2);

        // both busy once → b1 again
        let third = lb.lease(&candidates, &req).unwrap();
        assert_eq!(*third, b1);
        assert_eq!(lb.in_flight(&b1), 2);

        drop(first);
        drop(third);
        assert_eq!(lb.in_flight(&b1), 0);

        // b1 now idle, b2 still has one in flight
        let fourth = lb.lease(&candidates, &req).unwrap();
        assert_eq!(*fourth, b1);
        drop(second);
        assert_eq!(lb.in_flight(&b2), 0);
    }

    #[test]
    fn test_candidate_set_changes() {
        let lb = LeastConnection::new();
        let a = Endpoint::new("a", 1);
        let b = Endpoint::new("b", 1);
        let req = InboundRequest::get("/");

        let held = lb.lease(&[a.clone()], &req).unwrap();
        assert_eq!(*held, a);

        // `a` withdrawn while a lease is outstanding.
        let other = lb.lease(&[b.clone()], &req).unwrap();
        assert_eq!(*other, b);
        assert_eq!(lb.in_flight(&a), 0);

        // Dropping the orphaned lease must not disturb the new table.
        drop(held);
        assert_eq!(lb.in_flight(&b), 1);
    }

    #[test]
    fn test_cancelled_future_releases_count() {
        let lb = Arc::new(LeastConnection::new());
        let a = Endpoint::new("a", 1);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        runtime.block_on(async {
            let lease = lb.lease(&[a.clone()], &InboundRequest::get("/")).unwrap();
            let call = async move {
                let _lease = lease;
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            };
            let result = tokio::time::timeout(std::time::Duration::from_millis(10), call).await;
            assert!(result.is_err());
        });

        assert_eq!(lb.in_flight(&a), 0);
    }
}
