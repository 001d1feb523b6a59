//! Per-route mutable state.
//!
//! Built alongside the route table for every snapshot and dropped with it on
//! reload. Nothing here is shared between two routes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::cache::ResponseCache;
use crate::load_balancer::{self, LoadBalancer};
use crate::resilience::CircuitBreaker;
use crate::routing::{Route, RouteId, RouteTable};
use crate::security::rate_limit::RateLimiter;

/// Everything that changes while a route serves traffic.
#[derive(Debug)]
pub struct RouteState {
    pub limiter: Option<RateLimiter>,
    pub balancer: Box<dyn LoadBalancer>,
    pub breaker: Option<CircuitBreaker>,
    pub cache: Option<ResponseCache>,
}

impl RouteState {
    pub fn for_route(route: &Route) -> Self {
        Self {
            limiter: route.rate_limit.clone().map(RateLimiter::new),
            balancer: load_balancer::from_options(&route.load_balancer),
            breaker: route
                .qos
                .breaker
                .map(|settings| CircuitBreaker::new(route.id.as_str(), settings)),
            cache: route.cache.as_ref().map(|options| {
                ResponseCache::new(Duration::from_secs(options.ttl_seconds), options.region.clone())
            }),
        }
    }

    fn purge_expired(&self, now: Instant) {
        if let Some(limiter) = &self.limiter {
            limiter.purge_expired(now);
        }
        if let Some(cache) = &self.cache {
            cache.purge_expired(now);
        }
        self.balancer.purge_expired();
    }
}

/// Route identity → state, for one snapshot.
#[derive(Debug, Default)]
pub struct RouteStateRegistry {
    fixed: HashMap<RouteId, Arc<RouteState>>,
    dynamic: DashMap<RouteId, Arc<RouteState>>,
}

impl RouteStateRegistry {
    pub fn build(table: &RouteTable) -> Self {
        let fixed = table
            .routes()
            .map(|route| (route.id.clone(), Arc::new(RouteState::for_route(route))))
            .collect();
        Self {
            fixed,
            dynamic: DashMap::new(),
        }
    }

    /// State of a configured or remembered route. An unknown dynamic route gets
    /// fresh state that is not kept until `remember` is called.
    pub fn state_for(&self, route: &Route) -> Arc<RouteState> {
        self.get(&route.id)
            .unwrap_or_else(|| Arc::new(RouteState::for_route(route)))
    }

    /// Keep the state of a dynamic route whose service resolved. Returns the
    /// registered state, which may be one stored by a concurrent request.
    pub fn remember(&self, route: &Route, state: Arc<RouteState>) -> Arc<RouteState> {
        self.dynamic
            .entry(route.id.clone())
            .or_insert_with(|| {
                tracing::debug!(route = %route.id, "Registering state for dynamic route");
                state
            })
            .clone()
    }

    pub fn get(&self, id: &RouteId) -> Option<Arc<RouteState>> {
        self.fixed
            .get(id)
            .cloned()
            .or_else(|| self.dynamic.get(id).map(|s| s.value().clone()))
    }

    fn for_each(&self, mut f: impl FnMut(&RouteState)) {
        self.fixed.values().for_each(|s| f(s));
        self.dynamic.iter().for_each(|s| f(s.value()));
    }

    /// Drop expired counters, cache entries and sticky sessions.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.for_each(|state| state.purge_expired(now));
    }

    /// Clear every cache tagged with `region`. Returns the number of caches cleared.
    pub fn clear_cache_region(&self, region: &str) -> usize {
        let mut cleared = 0;
        self.for_each(|state| {
            if let Some(cache) = &state.cache {
                if cache.region() == Some(region) {
                    cache.clear();
                    cleared += 1;
                }
            }
        });
        cleared
    }

    pub fn len(&self) -> usize {
        self.fixed.len() + self.dynamic.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    use crate::config::{CacheOptions, GatewayConfig, GlobalConfig, QosOptions, RouteConfig};
    use crate::load_balancer::Endpoint;

    fn route(name: &str, region: Option<&str>) -> RouteConfig {
        RouteConfig {
            name: Some(name.into()),
            upstream_path_template: format!("/{}", name),
            downstream_path_template: "/".into(),
            downstream_host_and_ports: vec![Endpoint::new("localhost", 9000)],
            cache: region.map(|r| CacheOptions {
                ttl_seconds: 30,
                region: Some(r.into()),
                ..Default::default()
            }),
            qos: Some(QosOptions {
                exceptions_allowed_before_breaking: 2,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_every_route_gets_its_own_state() {
        let config = GatewayConfig {
            routes: vec![route("a", Some("products")), route("b", None)],
            ..Default::default()
        };
        let table = RouteTable::build(&config).unwrap();
        let registry = RouteStateRegistry::build(&table);

        assert_eq!(registry.len(), 2);
        let a = registry.get(&RouteId::new("a")).unwrap();
        let b = registry.get(&RouteId::new("b")).unwrap();
        assert!(a.cache.is_some());
        assert!(b.cache.is_none());
        assert!(!std::ptr::eq(
            a.breaker.as_ref().unwrap(),
            b.breaker.as_ref().unwrap()
        ));
    }

    #[test]
    fn test_clear_cache_region() {
        let config = GatewayConfig {
            routes: vec![route("a", Some("products")), route("b", Some("users"))],
            ..Default::default()
        };
        let registry = RouteStateRegistry::build(&RouteTable::build(&config).unwrap());
        assert_eq!(registry.clear_cache_region("products"), 1);
        assert_eq!(registry.clear_cache_region("orders"), 0);
    }

    #[test]
    fn test_dynamic_state_is_kept_only_when_remembered() {
        let registry = RouteStateRegistry::default();
        let route = Route::dynamic("orders", &Method::GET, &GlobalConfig::default(), None).unwrap();

        let transient = registry.state_for(&route);
        assert!(registry.is_empty());
        assert!(!Arc::ptr_eq(&transient, &registry.state_for(&route)));

        let kept = registry.remember(&route, transient.clone());
        assert!(Arc::ptr_eq(&kept, &transient));
        assert!(Arc::ptr_eq(&registry.state_for(&route), &transient));

        // A late registration defers to the state already kept.
        let late = registry.remember(&route, Arc::new(RouteState::for_route(&route)));
        assert!(Arc::ptr_eq(&late, &transient));
        assert_eq!(registry.len(), 1);
    }
}
