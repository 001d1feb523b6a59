//! Per-route TTL response store.

use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use crate::cache::CacheKey;
use crate::resilience::deadline;
use crate::transport::DownstreamResponse;

#[derive(Debug, Clone)]
struct CacheEntry {
    response: DownstreamResponse,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// TTL cache owned by one route.
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    region: Option<String>,
    entries: DashMap<CacheKey, CacheEntry>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, region: Option<String>) -> Self {
        Self {
            ttl,
            region,
            entries: DashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// Live entry for `key`; an expired one is evicted.
    pub fn try_get(&self, key: &CacheKey, now: Instant) -> Option<DownstreamResponse> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Some(entry.response.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        None
    }

    /// Store a response unless a live entry already exists.
    pub fn store(&self, key: CacheKey, response: DownstreamResponse, now: Instant) {
        let fresh = CacheEntry {
            response,
            expires_at: deadline(now, self.ttl),
        };
        match self.entries.entry(key) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_live(now) {
                    entry.insert(fresh);
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(fresh);
            }
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn purge_expired(&self, now: Instant) {
        self.entries.retain(|_, entry| entry.is_live(now));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
