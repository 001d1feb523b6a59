//! Compiled route definitions.
//!
//! A `Route` is built once per configuration snapshot and never mutated. All
//! mutable per-route state lives in `pipeline::state::RouteState`, keyed by
//! `RouteId`.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use axum::http::{Method, Version};
use thiserror::Error;

use crate::config::{
    AggregateRouteConfig, CacheOptions, DynamicRouteConfig, GlobalConfig, LoadBalancerOptions,
    RouteConfig,
};
use crate::http::request::InboundRequest;
use crate::load_balancer::Endpoint;
use crate::pipeline::transform::{TransformError, TransformRules};
use crate::resilience::QosPolicy;
use crate::routing::downstream::DownstreamTemplate;
use crate::routing::matcher::{AndMatcher, HeaderMatcher, HostMatcher, Matcher, MethodMatcher};
use crate::routing::template::{TemplateError, UpstreamTemplate};
use crate::security::rate_limit::{PeriodError, RateLimitPolicy};

/// Priority of a route whose template is a bare catch-all.
pub const CATCH_ALL_PRIORITY: i32 = 0;
/// Priority of every other route unless configured.
pub const DEFAULT_PRIORITY: i32 = 1;

#[derive(Debug, Error)]
pub enum RouteBuildError {
    #[error("route '{route}': {source}")]
    Template {
        route: String,
        #[source]
        source: TemplateError,
    },

    #[error("route '{route}': rate limit period: {source}")]
    Period {
        route: String,
        #[source]
        source: PeriodError,
    },

    #[error("route '{route}': {source}")]
    Transform {
        route: String,
        #[source]
        source: TransformError,
    },

    #[error("route '{route}': invalid method '{method}'")]
    Method { route: String, method: String },

    #[error("route '{route}': invalid downstream http version '{version}'")]
    HttpVersion { route: String, version: String },

    #[error("aggregate '{aggregate}': no route has key '{key}'")]
    UnknownRouteKey { aggregate: String, key: String },
}

/// Identity of a route, shared cheaply across tasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(Arc<str>);

impl RouteId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Method, host and header constraints of a route.
#[derive(Debug)]
pub struct RouteConditions {
    methods: MethodMatcher,
    host: Option<HostMatcher>,
    headers: AndMatcher,
}

impl RouteConditions {
    pub fn compile(
        route: &str,
        methods: &[String],
        host: Option<&str>,
        headers: &BTreeMap<String, String>,
    ) -> Result<Self, RouteBuildError> {
        let methods = methods
            .iter()
            .map(|m| {
                Method::from_bytes(m.trim().to_ascii_uppercase().as_bytes()).map_err(|_| {
                    RouteBuildError::Method {
                        route: route.to_string(),
                        method: m.clone(),
                    }
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let headers = headers
            .iter()
            .map(|(name, value)| {
                Box::new(HeaderMatcher::new(name.clone(), value.clone())) as Box<dyn Matcher>
            })
            .collect();

        Ok(Self {
            methods: MethodMatcher::new(methods),
            host: host.filter(|h| !h.is_empty()).map(HostMatcher::new),
            headers: AndMatcher::new(headers),
        })
    }

    pub fn matches(&self, request: &InboundRequest) -> bool {
        self.methods.matches(request)
            && self.host.as_ref().map(|h| h.matches(request)).unwrap_or(true)
            && self.headers.matches(request)
    }

    pub fn is_host_constrained(&self) -> bool {
        self.host.is_some()
    }

    pub fn header_count(&self) -> usize {
        self.headers.len()
    }
}

/// A compiled, immutable route.
#[derive(Debug)]
pub struct Route {
    pub id: RouteId,
    pub key: Option<String>,
    pub template: UpstreamTemplate,
    pub conditions: RouteConditions,
    pub downstream: DownstreamTemplate,
    pub downstream_scheme: String,
    pub downstream_version: Version,
    pub endpoints: Vec<Endpoint>,
    pub service_name: Option<String>,
    pub load_balancer: LoadBalancerOptions,
    pub qos: QosPolicy,
    pub rate_limit: Option<RateLimitPolicy>,
    pub cache: Option<CacheOptions>,
    pub transforms: TransformRules,
    pub authentication_required: bool,
    pub claims_requirement: Vec<(String, String)>,
    pub priority: i32,
    pub dynamic: bool,
}

impl Route {
    pub fn compile(config: &RouteConfig, index: usize, global: &GlobalConfig) -> Result<Self, RouteBuildError> {
        let id = config.id(index);
        let case_sensitive = config
            .route_is_case_sensitive
            .unwrap_or(global.route_is_case_sensitive);

        let template = UpstreamTemplate::parse(&config.upstream_path_template, case_sensitive)
            .map_err(|source| RouteBuildError::Template {
                route: id.clone(),
                source,
            })?;
        let downstream = DownstreamTemplate::parse(&config.downstream_path_template).map_err(|source| {
            RouteBuildError::Template {
                route: id.clone(),
                source,
            }
        })?;
        let conditions = RouteConditions::compile(
            &id,
            &config.upstream_http_method,
            config.upstream_host.as_deref(),
            &config.upstream_headers,
        )?;

        let rate_limit = match config.rate_limit.as_ref().or(global.rate_limit.as_ref()) {
            Some(options) => RateLimitPolicy::compile(options).map_err(|source| RouteBuildError::Period {
                route: id.clone(),
                source,
            })?,
            None => None,
        };

        let transforms = TransformRules::compile(config).map_err(|source| RouteBuildError::Transform {
            route: id.clone(),
            source,
        })?;

        let version = config
            .downstream_http_version
            .as_deref()
            .unwrap_or(&global.downstream_http_version);
        let downstream_version = parse_http_version(version).ok_or_else(|| RouteBuildError::HttpVersion {
            route: id.clone(),
            version: version.to_string(),
        })?;

        let priority = config.priority.unwrap_or(if template.is_catch_all_only() {
            CATCH_ALL_PRIORITY
        } else {
            DEFAULT_PRIORITY
        });

        Ok(Self {
            id: RouteId::new(&id),
            key: config.key.clone(),
            template,
            conditions,
            downstream,
            downstream_scheme: config
                .downstream_scheme
                .clone()
                .unwrap_or_else(|| global.downstream_scheme.clone()),
            downstream_version,
            endpoints: config.downstream_host_and_ports.clone(),
            service_name: config.service_name.clone(),
            load_balancer: config
                .load_balancer
                .clone()
                .unwrap_or_else(|| global.load_balancer.clone()),
            qos: QosPolicy::from_options(config.qos.as_ref().unwrap_or(&global.qos)),
            rate_limit,
            cache: config.cache.clone().filter(|c| c.ttl_seconds > 0),
            transforms,
            authentication_required: config.authentication_required,
            claims_requirement: config
                .route_claims_requirement
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            priority,
            dynamic: false,
        })
    }

    /// Route for `/<service>/...` resolved through discovery.
    pub fn dynamic(
        service: &str,
        method: &Method,
        global: &GlobalConfig,
        overrides: Option<&DynamicRouteConfig>,
    ) -> Result<Self, RouteBuildError> {
        let id = Self::dynamic_id(service, method);
        let config = RouteConfig {
            name: Some(id.to_string()),
            upstream_path_template: format!("/{}/{{*everything}}", service),
            upstream_http_method: vec![method.to_string()],
            downstream_path_template: "/{everything}".to_string(),
            downstream_http_version: overrides.and_then(|o| o.downstream_http_version.clone()),
            service_name: Some(service.to_string()),
            load_balancer: overrides.and_then(|o| o.load_balancer.clone()),
            qos: overrides.and_then(|o| o.qos.clone()),
            rate_limit: overrides.and_then(|o| o.rate_limit.clone()),
            // The service segment was taken from the request verbatim.
            route_is_case_sensitive: Some(true),
            ..Default::default()
        };
        let mut route = Self::compile(&config, 0, global)?;
        route.dynamic = true;
        Ok(route)
    }

    pub fn dynamic_id(service: &str, method: &Method) -> RouteId {
        RouteId::new(format!("dynamic:{}|{}", service, method))
    }
}

/// A compiled aggregate route.
#[derive(Debug)]
pub struct AggregateRoute {
    pub id: RouteId,
    pub template: UpstreamTemplate,
    pub conditions: RouteConditions,
    /// `(key, route)` in output order. A key may appear for several routes.
    pub members: Vec<(String, Arc<Route>)>,
    pub aggregator: Option<String>,
    pub priority: i32,
}

impl AggregateRoute {
    pub fn compile(
        config: &AggregateRouteConfig,
        index: usize,
        global: &GlobalConfig,
        routes: &[Arc<Route>],
    ) -> Result<Self, RouteBuildError> {
        let id = config.id(index);
        let case_sensitive = config
            .route_is_case_sensitive
            .unwrap_or(global.route_is_case_sensitive);
        let template = UpstreamTemplate::parse(&config.upstream_path_template, case_sensitive)
            .map_err(|source| RouteBuildError::Template {
                route: id.clone(),
                source,
            })?;
        let conditions = RouteConditions::compile(
            &id,
            &config.upstream_http_method,
            config.upstream_host.as_deref(),
            &config.upstream_headers,
        )?;

        let mut members = Vec::new();
        for key in &config.route_keys {
            let keyed: Vec<&Arc<Route>> = routes
                .iter()
                .filter(|r| r.key.as_deref() == Some(key.as_str()))
                .collect();
            if keyed.is_empty() {
                return Err(RouteBuildError::UnknownRouteKey {
                    aggregate: id.clone(),
                    key: key.clone(),
                });
            }
            members.extend(keyed.into_iter().map(|r| (key.clone(), r.clone())));
        }

        Ok(Self {
            id: RouteId::new(&id),
            priority: config.priority.unwrap_or(if template.is_catch_all_only() {
                CATCH_ALL_PRIORITY
            } else {
                DEFAULT_PRIORITY
            }),
            template,
            conditions,
            members,
            aggregator: config.aggregator.clone(),
        })
    }
}

pub fn parse_http_version(raw: &str) -> Option<Version> {
    match raw.trim() {
        "1.0" => Some(Version::HTTP_10),
        "1.1" | "1" => Some(Version::HTTP_11),
        "2" | "2.0" => Some(Version::HTTP_2),
        _ => None,
    }
}
