//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::load_balancer::Endpoint;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Defaults applied to every route that does not override them.
    pub global: GlobalConfig,

    /// Route definitions mapping upstream templates to downstream services.
    pub routes: Vec<RouteConfig>,

    /// Aggregate routes fanning out to several keyed routes.
    pub aggregates: Vec<AggregateRouteConfig>,

    /// Per-service policy overrides for dynamic routing.
    pub dynamic_routes: Vec<DynamicRouteConfig>,

    /// Static service registry used by service discovery.
    pub services: Vec<ServiceConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum buffered request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Gateway-wide defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Public base URL of the gateway, exposed to header transforms as `{BaseUrl}`.
    pub base_url: Option<String>,

    /// Header carrying the request id to downstream services.
    pub request_id_key: Option<String>,

    /// Literal path segments compare case-sensitively when true.
    pub route_is_case_sensitive: bool,

    /// Scheme used when neither the route nor the endpoint names one.
    pub downstream_scheme: String,

    /// HTTP version used when the route does not name one ("1.1" or "2").
    pub downstream_http_version: String,

    pub qos: QosOptions,

    pub rate_limit: Option<RateLimitOptions>,

    pub load_balancer: LoadBalancerOptions,

    /// Status returned when a route resolves to no endpoints (404 or 503).
    pub endpoint_unavailable_status: u16,

    /// Route `/{service}/{rest}` through discovery when nothing else matches.
    pub dynamic_routing: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            request_id_key: None,
            route_is_case_sensitive: false,
            downstream_scheme: "http".to_string(),
            downstream_http_version: "1.1".to_string(),
            qos: QosOptions::default(),
            rate_limit: None,
            load_balancer: LoadBalancerOptions::default(),
            endpoint_unavailable_status: 503,
            dynamic_routing: false,
        }
    }
}

/// A configured route.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics. Defaults to `<template>#<index>`.
    pub name: Option<String>,

    /// Key under which aggregates reference this route.
    pub key: Option<String>,

    /// Upstream path template, e.g. `/products/{id}`.
    pub upstream_path_template: String,

    /// Accepted methods. Empty accepts every method.
    pub upstream_http_method: Vec<String>,

    /// Host header the request must carry (exact match).
    pub upstream_host: Option<String>,

    /// Headers the request must carry with exactly these values.
    pub upstream_headers: BTreeMap<String, String>,

    /// Downstream path template; may reference upstream placeholders and carry a `?query`.
    pub downstream_path_template: String,

    pub downstream_scheme: Option<String>,

    /// "1.1" or "2".
    pub downstream_http_version: Option<String>,

    /// Static endpoints. Ignored when `service_name` is set.
    pub downstream_host_and_ports: Vec<Endpoint>,

    /// Service discovery name.
    pub service_name: Option<String>,

    pub load_balancer: Option<LoadBalancerOptions>,

    pub qos: Option<QosOptions>,

    pub rate_limit: Option<RateLimitOptions>,

    pub cache: Option<CacheOptions>,

    /// Header name → `"find, replace"` (or a plain value to set) applied before dispatch.
    pub upstream_header_transform: BTreeMap<String, String>,

    /// Header name → `"find, replace"` (or a plain value to set) applied to the response.
    pub downstream_header_transform: BTreeMap<String, String>,

    /// Header name → claim selector (`Claims[sub] > value`).
    pub add_headers_to_request: BTreeMap<String, String>,

    /// Query parameter → claim selector.
    pub add_queries_to_request: BTreeMap<String, String>,

    /// Route priority (higher = checked first). Defaults to 1, or 0 for a bare catch-all.
    pub priority: Option<i32>,

    /// Overrides the global case-sensitivity flag.
    pub route_is_case_sensitive: Option<bool>,

    /// Reject requests without an authenticated principal.
    pub authentication_required: bool,

    /// Claim name → required value.
    pub route_claims_requirement: BTreeMap<String, String>,
}

impl RouteConfig {
    /// Identity used for per-route state, logs and metrics.
    pub fn id(&self, index: usize) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}#{}", self.upstream_path_template, index),
        }
    }
}

/// An aggregate route combining several keyed routes into one JSON body.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AggregateRouteConfig {
    pub name: Option<String>,

    pub upstream_path_template: String,

    /// Accepted methods. Defaults to GET only.
    pub upstream_http_method: Vec<String>,

    pub upstream_host: Option<String>,

    pub upstream_headers: BTreeMap<String, String>,

    /// Keys of the routes to fan out to, in output order.
    pub route_keys: Vec<String>,

    /// Name of a registered custom aggregator. Defaults to the JSON merger.
    pub aggregator: Option<String>,

    pub priority: Option<i32>,

    pub route_is_case_sensitive: Option<bool>,
}

impl Default for AggregateRouteConfig {
    fn default() -> Self {
        Self {
            name: None,
            upstream_path_template: String::new(),
            upstream_http_method: vec!["GET".to_string()],
            upstream_host: None,
            upstream_headers: BTreeMap::new(),
            route_keys: Vec::new(),
            aggregator: None,
            priority: None,
            route_is_case_sensitive: None,
        }
    }
}

impl AggregateRouteConfig {
    pub fn id(&self, index: usize) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("aggregate:{}#{}", self.upstream_path_template, index),
        }
    }
}

/// Policy overrides for one dynamically routed service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DynamicRouteConfig {
    pub service_name: String,
    pub rate_limit: Option<RateLimitOptions>,
    pub qos: Option<QosOptions>,
    pub load_balancer: Option<LoadBalancerOptions>,
    pub downstream_http_version: Option<String>,
}

/// A statically registered service and its instances.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub endpoints: Vec<Endpoint>,
}

/// Load balancing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancerKind {
    /// Always the first candidate.
    #[default]
    NoLoadBalancer,
    RoundRobin,
    LeastConnection,
    CookieStickySessions,
}

/// Load balancer selection and options.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancerOptions {
    #[serde(rename = "type")]
    pub kind: LoadBalancerKind,

    /// Cookie name for sticky sessions.
    pub key: Option<String>,

    /// Sticky session lifetime in milliseconds.
    pub expiry_ms: u64,
}

impl Default for LoadBalancerOptions {
    fn default() -> Self {
        Self {
            kind: LoadBalancerKind::NoLoadBalancer,
            key: None,
            expiry_ms: 20 * 60 * 1000,
        }
    }
}

/// Circuit breaker and timeout policy.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct QosOptions {
    /// Consecutive failures that open the circuit. 0 disables breaking.
    pub exceptions_allowed_before_breaking: u32,

    /// How long the circuit stays open, in milliseconds.
    pub duration_of_break_ms: u64,

    /// Per-call timeout in milliseconds. Defaults to 90 seconds.
    pub timeout_ms: Option<u64>,

    /// Failures older than this no longer count toward breaking, in milliseconds.
    pub sampling_duration_ms: u64,
}

impl Default for QosOptions {
    fn default() -> Self {
        Self {
            exceptions_allowed_before_breaking: 0,
            duration_of_break_ms: 5_000,
            timeout_ms: None,
            sampling_duration_ms: 10_000,
        }
    }
}

/// Fixed-window rate limiting.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitOptions {
    pub enable_rate_limiting: bool,

    /// Header identifying the client.
    pub client_id_header: String,

    /// Client ids that are never limited.
    pub client_whitelist: Vec<String>,

    /// Window length, e.g. "1s", "500ms", "5m".
    pub period: String,

    /// Requests admitted per window.
    pub limit: u64,

    /// Body of the rejection response.
    pub quota_exceeded_message: Option<String>,

    /// Status of the rejection response.
    pub http_status_code: u16,

    /// Suppress `Retry-After` and `X-Rate-Limit-*` headers.
    pub disable_rate_limit_headers: bool,

    /// Client id used when the header is absent.
    pub default_client_id: Option<String>,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            enable_rate_limiting: true,
            client_id_header: "ClientId".to_string(),
            client_whitelist: Vec::new(),
            period: "1s".to_string(),
            limit: 0,
            quota_exceeded_message: None,
            http_status_code: 429,
            disable_rate_limit_headers: false,
            default_client_id: None,
        }
    }
}

/// Response caching.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CacheOptions {
    /// Entry lifetime. 0 disables caching.
    pub ttl_seconds: u64,

    /// Region tag used for bulk invalidation.
    pub region: Option<String>,

    /// Request headers that participate in the cache key.
    pub vary_headers: Vec<String>,

    /// Include the request body in the cache key.
    pub enable_content_hashing: bool,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
