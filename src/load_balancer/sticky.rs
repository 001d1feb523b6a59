//! Cookie-based sticky sessions.
//!
//! # Behaviour
//! - Requests carrying the session cookie are pinned to the endpoint first assigned
//!   to that session; every hit pushes the expiry forward
//! - New, expired, or orphaned sessions (endpoint no longer a candidate) are
//!   assigned by round robin
//! - Requests without the cookie are round-robined and not recorded
//!
//! # Design Decisions
//! - The session map is a `DashMap`; the entry API holds the shard lock during
//!   assignment so concurrent first requests of one session agree on an endpoint
//! - Expired sessions are replaced on lookup and swept periodically

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::http::request::InboundRequest;
use crate::load_balancer::{Endpoint, Lease, LoadBalancer, RoundRobin};
use crate::resilience::deadline;

#[derive(Debug, Clone)]
struct StickySession {
    endpoint: Endpoint,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct CookieStickySessions {
    cookie: String,
    expiry: Duration,
    inner: RoundRobin,
    sessions: DashMap<String, StickySession>,
}

impl CookieStickySessions {
    pub fn new(cookie: impl Into<String>, expiry: Duration) -> Self {
        Self {
            cookie: cookie.into(),
            expiry,
            inner: RoundRobin::new(),
            sessions: DashMap::new(),
        }
    }

    pub fn lease_at(&self, candidates: &[Endpoint], request: &InboundRequest, now: Instant) -> Option<Lease> {
        let Some(session) = request.cookie(&self.cookie) else {
            return self.inner.lease(candidates, request);
        };

        match self.sessions.entry(session) {
            Entry::Occupied(mut entry) => {
                let current = entry.get();
                if current.expires_at > now && candidates.contains(&current.endpoint) {
                    let endpoint = current.endpoint.clone();
                    entry.get_mut().expires_at = deadline(now, self.expiry);
                    return Some(Lease::new(endpoint));
                }
                let endpoint = self.inner.next(candidates)?.clone();
                tracing::debug!(
                    session_cookie = %self.cookie,
                    endpoint = %endpoint,
                    "Sticky session reassigned"
                );
                entry.insert(StickySession {
                    endpoint: endpoint.clone(),
                    expires_at: deadline(now, self.expiry),
                });
                Some(Lease::new(endpoint))
            }
            Entry::Vacant(entry) => {
                let endpoint = self.inner.next(candidates)?.clone();
                entry.insert(StickySession {
                    endpoint: endpoint.clone(),
                    expires_at: deadline(now, self.expiry),
                });
                Some(Lease::new(endpoint))
            }
        }
    }

    pub fn purge_expired_at(&self, now: Instant) {
        self.sessions.retain(|_, s| s.expires_at > now);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

impl LoadBalancer for CookieStickySessions {
    fn lease(&self, candidates: &[Endpoint], request: &InboundRequest) -> Option<Lease> {
        self.lease_at(candidates, request, Instant::now())
    }

    fn purge_expired(&self) {
        self.purge_expired_at(Instant::now());
    }
}
