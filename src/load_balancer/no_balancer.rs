//! Pass-through selection: the first candidate, always.

use crate::http::request::InboundRequest;
use crate::load_balancer::{Endpoint, Lease, LoadBalancer};

#[derive(Debug, Default, Clone, Copy)]
pub struct NoLoadBalancer;

impl LoadBalancer for NoLoadBalancer {
    fn lease(&self, candidates: &[Endpoint], _request: &InboundRequest) -> Option<Lease> {
        candidates.first().cloned().map(Lease::new)
    }
}
