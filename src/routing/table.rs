//! Route table: ordered lookup over compiled routes and aggregates.
//!
//! # Responsibilities
//! - Compile every configured route and aggregate once per snapshot
//! - Order candidates deterministically
//! - Fall back to dynamic routing when enabled
//!
//! # Design Decisions
//! - Immutable after construction apart from the dynamic route cache
//! - A dynamic route is cached only once its service has resolved to endpoints
//! - O(n) scan in priority order (acceptable for typical route counts)
//! - Explicit `RouteNotFound` rather than a silent default

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::{DynamicRouteConfig, GatewayConfig, GlobalConfig};
use crate::error::{GatewayError, GatewayResult};
use crate::http::request::InboundRequest;
use crate::routing::route::{AggregateRoute, Route, RouteBuildError, RouteConditions, RouteId};
use crate::routing::template::{Placeholders, UpstreamTemplate};

/// What a request was matched to.
#[derive(Debug, Clone)]
pub enum RouteTarget {
    Route(Arc<Route>),
    Aggregate(Arc<AggregateRoute>),
}

impl RouteTarget {
    pub fn id(&self) -> &str {
        match self {
            RouteTarget::Route(r) => r.id.as_str(),
            RouteTarget::Aggregate(a) => a.id.as_str(),
        }
    }
}

/// A successful lookup.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub target: RouteTarget,
    pub placeholders: Placeholders,
}

#[derive(Debug)]
struct Candidate {
    target: RouteTarget,
    rank: (Reverse<i32>, bool, Reverse<usize>, usize, usize),
}

impl Candidate {
    fn new(target: RouteTarget, order: usize) -> Self {
        let (template, conditions, priority) = parts(&target);
        let rank = (
            Reverse(priority),
            !conditions.is_host_constrained(),
            Reverse(conditions.header_count()),
            template.wildcard_count(),
            order,
        );
        Self { target, rank }
    }
}

fn parts(target: &RouteTarget) -> (&UpstreamTemplate, &RouteConditions, i32) {
    match target {
        RouteTarget::Route(r) => (&r.template, &r.conditions, r.priority),
        RouteTarget::Aggregate(a) => (&a.template, &a.conditions, a.priority),
    }
}

/// Immutable route lookup for one configuration snapshot.
#[derive(Debug)]
pub struct RouteTable {
    candidates: Vec<Candidate>,
    routes: Vec<Arc<Route>>,
    global: GlobalConfig,
    dynamic_overrides: HashMap<String, DynamicRouteConfig>,
    dynamic_routes: DashMap<RouteId, Arc<Route>>,
}

impl RouteTable {
    pub fn build(config: &GatewayConfig) -> Result<Self, RouteBuildError> {
        let routes = config
            .routes
            .iter()
            .enumerate()
            .map(|(i, r)| Route::compile(r, i, &config.global).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        let aggregates = config
            .aggregates
            .iter()
            .enumerate()
            .map(|(i, a)| AggregateRoute::compile(a, i, &config.global, &routes).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        let mut candidates: Vec<Candidate> = routes
            .iter()
            .cloned()
            .map(RouteTarget::Route)
            .chain(aggregates.into_iter().map(RouteTarget::Aggregate))
            .enumerate()
            .map(|(order, target)| Candidate::new(target, order))
            .collect();
        candidates.sort_by(|a, b| a.rank.cmp(&b.rank));

        let dynamic_overrides = config
            .dynamic_routes
            .iter()
            .map(|d| (d.service_name.clone(), d.clone()))
            .collect();

        tracing::debug!(
            routes = routes.len(),
            aggregates = config.aggregates.len(),
            "Route table compiled"
        );

        Ok(Self {
            candidates,
            routes,
            global: config.global.clone(),
            dynamic_overrides,
            dynamic_routes: DashMap::new(),
        })
    }

    /// First matching configured route or aggregate, in priority order.
    pub fn find(&self, request: &InboundRequest) -> Option<RouteMatch> {
        self.candidates.iter().find_map(|candidate| {
            let (template, conditions, _) = parts(&candidate.target);
            if !conditions.matches(request) {
                return None;
            }
            template.matches(&request.path).map(|placeholders| RouteMatch {
                target: candidate.target.clone(),
                placeholders,
            })
        })
    }

    /// `find`, then dynamic routing, then `RouteNotFound`.
    pub fn resolve(&self, request: &InboundRequest) -> GatewayResult<RouteMatch> {
        if let Some(found) = self.find(request) {
            return Ok(found);
        }
        if self.global.dynamic_routing {
            if let Some(found) = self.dynamic(request) {
                return Ok(found);
            }
        }
        Err(GatewayError::RouteNotFound {
            method: request.method.to_string(),
            path: request.path.clone(),
        })
    }

    fn dynamic(&self, request: &InboundRequest) -> Option<RouteMatch> {
        let service = request
            .path
            .strip_prefix('/')
            .and_then(|p| p.split('/').next())
            .filter(|s| !s.is_empty())?;

        let id = Route::dynamic_id(service, &request.method);
        let cached = self.dynamic_routes.get(&id).map(|r| r.value().clone());
        let route = match cached {
            Some(route) => route,
            None => Route::dynamic(
                service,
                &request.method,
                &self.global,
                self.dynamic_overrides.get(service),
            )
            .map(Arc::new)
            .map_err(|e| tracing::debug!(service = %service, error = %e, "Dynamic route rejected"))
            .ok()?,
        };

        route.template.matches(&request.path).map(|placeholders| RouteMatch {
            target: RouteTarget::Route(route),
            placeholders,
        })
    }

    /// Keep a dynamic route for later requests. Returns the cached instance,
    /// which may have been stored by a concurrent request.
    pub fn remember_dynamic(&self, route: &Arc<Route>) -> Arc<Route> {
        self.dynamic_routes
            .entry(route.id.clone())
            .or_insert_with(|| route.clone())
            .clone()
    }

    pub fn dynamic_route_count(&self) -> usize {
        self.dynamic_routes.len()
    }

    /// Every configured route, in declaration order.
    pub fn routes(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use crate::config::{AggregateRouteConfig, RouteConfig};
    use crate::load_balancer::Endpoint;

    fn route(template: &str, name: &str) -> RouteConfig {
        RouteConfig {
            name: Some(name.into()),
            upstream_path_template: template.into(),
            downstream_path_template: "/".into(),
            downstream_host_and_ports: vec![Endpoint::new("localhost", 9000)],
            ..Default::default()
        }
    }

    fn table(routes: Vec<RouteConfig>) -> RouteTable {
        RouteTable::build(&GatewayConfig {
            routes,
            ..Default::default()
        })
        .unwrap()
    }

    fn matched(table: &RouteTable, request: &InboundRequest) -> String {
        table.resolve(request).unwrap().target.id().to_string()
    }

    #[test]
    fn test_catch_all_loses_to_specific() {
        let table = table(vec![route("/{everything}", "catch"), route("/products/{id}", "products")]);

        assert_eq!(matched(&table, &InboundRequest::get("/products/1")), "products");
        assert_eq!(matched(&table, &InboundRequest::get("/anything/else")), "catch");
    }

    #[test]
    fn test_explicit_priority_wins() {
        let mut low = route("/a/{x}", "low");
        low.priority = Some(1);
        let mut high = route("/a/{x}", "high");
        high.priority = Some(5);
        let table = table(vec![low, high]);

        assert_eq!(matched(&table, &InboundRequest::get("/a/1")), "high");
    }

    #[test]
    fn test_host_and_headers_rank_first() {
        let plain = route("/a", "plain");
        let mut hosted = route("/a", "hosted");
        hosted.upstream_host = Some("api.local".into());
        let mut versioned = route("/a", "versioned");
        versioned.upstream_headers.insert("x-version".into(), "2".into());
        let table = table(vec![plain, versioned, hosted]);

        assert_eq!(matched(&table, &InboundRequest::get("/a").host("api.local")), "hosted");
        assert_eq!(matched(&table, &InboundRequest::get("/a").header("x-version", "2")), "versioned");
        assert_eq!(matched(&table, &InboundRequest::get("/a")), "plain");
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let table = table(vec![route("/a/{x}", "first"), route("/a/{y}", "second")]);
        assert_eq!(matched(&table, &InboundRequest::get("/a/1")), "first");
    }

    #[test]
    fn test_method_filter_and_not_found() {
        let mut post_only = route("/orders", "orders");
        post_only.upstream_http_method = vec!["POST".into()];
        let table = table(vec![post_only]);

        assert!(matches!(
            table.resolve(&InboundRequest::get("/orders")),
            Err(GatewayError::RouteNotFound { .. })
        ));
        assert_eq!(
            matched(&table, &InboundRequest::new(Method::POST, "/orders")),
            "orders"
        );
    }

    #[test]
    fn test_case_sensitivity() {
        let mut sensitive = route("/Products", "sensitive");
        sensitive.route_is_case_sensitive = Some(true);
        let sensitive_table = table(vec![sensitive]);
        assert!(sensitive_table.find(&InboundRequest::get("/products")).is_none());
        assert!(sensitive_table.find(&InboundRequest::get("/Products")).is_some());

        let insensitive = table(vec![route("/Products", "insensitive")]);
        assert!(insensitive.find(&InboundRequest::get("/PRODUCTS")).is_some());
    }

    #[test]
    fn test_aggregate_matches() {
        let mut tom = route("/tom", "tom");
        tom.key = Some("Tom".into());
        let config = GatewayConfig {
            routes: vec![tom],
            aggregates: vec![AggregateRouteConfig {
                name: Some("agg".into()),
                upstream_path_template: "/".into(),
                route_keys: vec!["Tom".into()],
                ..Default::default()
            }],
            ..Default::default()
        };
        let table = RouteTable::build(&config).unwrap();

        let found = table.resolve(&InboundRequest::get("/")).unwrap();
        assert!(matches!(found.target, RouteTarget::Aggregate(_)));
        assert_eq!(found.target.id(), "agg");
        assert!(table.resolve(&InboundRequest::new(Method::POST, "/")).is_err());
    }

    #[test]
    fn test_dynamic_routing_fallback() {
        let mut config = GatewayConfig::default();
        config.global.dynamic_routing = true;
        let table = RouteTable::build(&config).unwrap();

        let found = table.resolve(&InboundRequest::get("/billing/invoices/3")).unwrap();
        let RouteTarget::Route(route) = &found.target else {
            panic!("expected a route");
        };
        assert!(route.dynamic);
        assert_eq!(route.service_name.as_deref(), Some("billing"));
        assert_eq!(found.placeholders.get("everything"), Some("invoices/3"));
        assert_eq!(table.dynamic_route_count(), 0);

        let remembered = table.remember_dynamic(route);
        assert_eq!(table.dynamic_route_count(), 1);
        let again = table.resolve(&InboundRequest::get("/billing/x")).unwrap();
        let RouteTarget::Route(cached) = &again.target else {
            panic!("expected a route");
        };
        assert!(Arc::ptr_eq(&remembered, cached));

        assert!(table.resolve(&InboundRequest::get("/")).is_err());
    }
}
