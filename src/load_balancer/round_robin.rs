//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::http::request::InboundRequest;
use crate::load_balancer::{Endpoint, Lease, LoadBalancer};

/// Round-robin selector.
/// Stores an internal counter to rotate through candidates.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next candidate in rotation, without wrapping it in a lease.
    pub fn next<'a>(&self, candidates: &'a [Endpoint]) -> Option<&'a Endpoint> {
        if candidates.is_empty() {
            return None;
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
        candidates.get(index)
    }
}

impl LoadBalancer for RoundRobin {
    fn lease(&self, candidates: &[Endpoint], _request: &InboundRequest) -> Option<Lease> {
        self.next(candidates).cloned().map(Lease::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[test]
    fn test_round_robin() {
        let lb = RoundRobin::new();
        let candidates = vec![Endpoint::new("a", 8080), Endpoint::new("b", 8081)];
        let req = InboundRequest::get("/");

        assert_eq!(lb.lease(&candidates, &req).unwrap().host, "a");
        assert_eq!(lb.lease(&candidates, &req).unwrap().host, "b");
        assert_eq!(lb.lease(&candidates, &req).unwrap().host, "a");
    }

    #[test]
    fn test_even_distribution_under_concurrency() {
        let lb = Arc::new(RoundRobin::new());
        let candidates = Arc::new(vec![
            Endpoint::new("a", 1),
            Endpoint::new("b", 1),
            Endpoint::new("c", 1),
        ]);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let lb = lb.clone();
                let candidates = candidates.clone();
                std::thread::spawn(move || {
                    let req = InboundRequest::get("/");
                    (0..300)
                        .map(|_| lb.lease(&candidates, &req).unwrap().host.clone())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut counts: HashMap<String, usize> = HashMap::new();
        for handle in handles {
            for host in handle.join().unwrap() {
                *counts.entry(host).or_default() += 1;
            }
        }

        // fetch_add hands out every slot exactly once.
        assert_eq!(counts.values().copied().collect::<Vec<_>>(), vec![400, 400, 400]);
    }

    #[test]
    fn test_empty_candidates() {
        assert!(RoundRobin::new().lease(&[], &InboundRequest::get("/")).is_none());
    }
}
