//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (aggregates reference existing route keys)
//! - Validate value ranges (periods, limits, status codes, durations)
//! - Detect duplicate route identifiers
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use axum::http::StatusCode;

use crate::config::schema::{
    CacheOptions, GatewayConfig, LoadBalancerKind, LoadBalancerOptions, QosOptions, RateLimitOptions,
    RouteConfig,
};
use crate::pipeline::transform::TransformRules;
use crate::routing::downstream::DownstreamTemplate;
use crate::routing::route::{parse_http_version, RouteConditions};
use crate::routing::template::UpstreamTemplate;
use crate::security::rate_limit::parse_period;

/// Longest accepted ttl, break, timeout, sampling, expiry or rate-limit period.
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 86_400);

/// A single semantic problem, located by a dotted path into the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub location: String,
    pub message: String,
}

impl ValidationError {
    fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_status(
        "global.endpoint_unavailable_status",
        config.global.endpoint_unavailable_status,
        &mut errors,
    );
    if parse_http_version(&config.global.downstream_http_version).is_none() {
        errors.push(ValidationError::new(
            "global.downstream_http_version",
            format!("unsupported version '{}'", config.global.downstream_http_version),
        ));
    }
    if let Some(rate_limit) = &config.global.rate_limit {
        check_rate_limit("global.rate_limit", rate_limit, &mut errors);
    }
    check_qos("global.qos", &config.global.qos, &mut errors);
    check_load_balancer("global.load_balancer", &config.global.load_balancer, &mut errors);

    let mut ids = HashSet::new();
    for (index, route) in config.routes.iter().enumerate() {
        let location = format!("routes[{}]", index);
        check_route(&location, route, config.global.route_is_case_sensitive, &mut errors);
        if !ids.insert(route.id(index)) {
            errors.push(ValidationError::new(
                location,
                format!("duplicate route name '{}'", route.id(index)),
            ));
        }
    }

    let keys: HashSet<&str> = config.routes.iter().filter_map(|r| r.key.as_deref()).collect();
    for (index, aggregate) in config.aggregates.iter().enumerate() {
        let location = format!("aggregates[{}]", index);
        if let Err(e) = UpstreamTemplate::parse(&aggregate.upstream_path_template, true) {
            errors.push(ValidationError::new(format!("{}.upstream_path_template", location), e.to_string()));
        }
        if let Err(e) = RouteConditions::compile(
            &location,
            &aggregate.upstream_http_method,
            aggregate.upstream_host.as_deref(),
            &aggregate.upstream_headers,
        ) {
            errors.push(ValidationError::new(format!("{}.upstream_http_method", location), e.to_string()));
        }
        if aggregate.route_keys.is_empty() {
            errors.push(ValidationError::new(format!("{}.route_keys", location), "must not be empty"));
        }
        for key in &aggregate.route_keys {
            if !keys.contains(key.as_str()) {
                errors.push(ValidationError::new(
                    format!("{}.route_keys", location),
                    format!("no route has key '{}'", key),
                ));
            }
        }
        if !ids.insert(aggregate.id(index)) {
            errors.push(ValidationError::new(
                location,
                format!("duplicate route name '{}'", aggregate.id(index)),
            ));
        }
    }

    for (index, dynamic) in config.dynamic_routes.iter().enumerate() {
        let location = format!("dynamic_routes[{}]", index);
        if dynamic.service_name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.service_name", location), "must not be empty"));
        }
        if let Some(rate_limit) = &dynamic.rate_limit {
            check_rate_limit(&format!("{}.rate_limit", location), rate_limit, &mut errors);
        }
        if let Some(qos) = &dynamic.qos {
            check_qos(&format!("{}.qos", location), qos, &mut errors);
        }
        if let Some(lb) = &dynamic.load_balancer {
            check_load_balancer(&format!("{}.load_balancer", location), lb, &mut errors);
        }
        if let Some(version) = &dynamic.downstream_http_version {
            if parse_http_version(version).is_none() {
                errors.push(ValidationError::new(
                    format!("{}.downstream_http_version", location),
                    format!("unsupported version '{}'", version),
                ));
            }
        }
    }

    for (index, service) in config.services.iter().enumerate() {
        if service.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("services[{}].name", index), "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_route(location: &str, route: &RouteConfig, global_case_sensitive: bool, errors: &mut Vec<ValidationError>) {
    let case_sensitive = route.route_is_case_sensitive.unwrap_or(global_case_sensitive);
    let upstream = match UpstreamTemplate::parse(&route.upstream_path_template, case_sensitive) {
        Ok(template) => Some(template),
        Err(e) => {
            errors.push(ValidationError::new(format!("{}.upstream_path_template", location), e.to_string()));
            None
        }
    };

    match DownstreamTemplate::parse(&route.downstream_path_template) {
        Ok(downstream) => {
            if let Some(upstream) = &upstream {
                let known: HashSet<&str> = upstream.placeholder_names().collect();
                for name in downstream.placeholder_names() {
                    if !known.contains(name) {
                        errors.push(ValidationError::new(
                            format!("{}.downstream_path_template", location),
                            format!("placeholder '{{{}}}' is not captured upstream", name),
                        ));
                    }
                }
            }
        }
        Err(e) => errors.push(ValidationError::new(
            format!("{}.downstream_path_template", location),
            e.to_string(),
        )),
    }

    if let Err(e) = RouteConditions::compile(
        location,
        &route.upstream_http_method,
        route.upstream_host.as_deref(),
        &route.upstream_headers,
    ) {
        errors.push(ValidationError::new(format!("{}.upstream_http_method", location), e.to_string()));
    }

    if route.downstream_host_and_ports.is_empty() && route.service_name.is_none() {
        errors.push(ValidationError::new(
            location,
            "needs downstream_host_and_ports or service_name",
        ));
    }
    for (i, endpoint) in route.downstream_host_and_ports.iter().enumerate() {
        if endpoint.host.trim().is_empty() {
            errors.push(ValidationError::new(
                format!("{}.downstream_host_and_ports[{}].host", location, i),
                "must not be empty",
            ));
        }
    }

    if let Some(version) = &route.downstream_http_version {
        if parse_http_version(version).is_none() {
            errors.push(ValidationError::new(
                format!("{}.downstream_http_version", location),
                format!("unsupported version '{}'", version),
            ));
        }
    }

    if let Some(rate_limit) = &route.rate_limit {
        check_rate_limit(&format!("{}.rate_limit", location), rate_limit, errors);
    }
    if let Some(lb) = &route.load_balancer {
        check_load_balancer(&format!("{}.load_balancer", location), lb, errors);
    }
    if let Some(qos) = &route.qos {
        check_qos(&format!("{}.qos", location), qos, errors);
    }
    if let Some(cache) = &route.cache {
        check_cache(&format!("{}.cache", location), cache, errors);
    }

    if let Err(e) = TransformRules::compile(route) {
        errors.push(ValidationError::new(location, e.to_string()));
    }
}

fn check_rate_limit(location: &str, options: &RateLimitOptions, errors: &mut Vec<ValidationError>) {
    if !options.enable_rate_limiting {
        return;
    }
    match parse_period(&options.period) {
        Ok(period) if period > MAX_DURATION => errors.push(ValidationError::new(
            format!("{}.period", location),
            format!("must not exceed {}s", MAX_DURATION.as_secs()),
        )),
        Ok(_) => {}
        Err(e) => errors.push(ValidationError::new(format!("{}.period", location), e.to_string())),
    }
    if options.limit == 0 {
        errors.push(ValidationError::new(format!("{}.limit", location), "must be greater than 0"));
    }
    check_status(&format!("{}.http_status_code", location), options.http_status_code, errors);
}

fn check_load_balancer(location: &str, options: &LoadBalancerOptions, errors: &mut Vec<ValidationError>) {
    if options.kind == LoadBalancerKind::CookieStickySessions
        && options.key.as_deref().is_some_and(|k| k.trim().is_empty())
    {
        errors.push(ValidationError::new(format!("{}.key", location), "cookie name must not be empty"));
    }
    check_duration(
        &format!("{}.expiry_ms", location),
        Duration::from_millis(options.expiry_ms),
        errors,
    );
}

fn check_qos(location: &str, options: &QosOptions, errors: &mut Vec<ValidationError>) {
    check_duration(
        &format!("{}.duration_of_break_ms", location),
        Duration::from_millis(options.duration_of_break_ms),
        errors,
    );
    check_duration(
        &format!("{}.sampling_duration_ms", location),
        Duration::from_millis(options.sampling_duration_ms),
        errors,
    );
    if let Some(timeout) = options.timeout_ms {
        check_duration(&format!("{}.timeout_ms", location), Duration::from_millis(timeout), errors);
    }
}

fn check_cache(location: &str, options: &CacheOptions, errors: &mut Vec<ValidationError>) {
    check_duration(
        &format!("{}.ttl_seconds", location),
        Duration::from_secs(options.ttl_seconds),
        errors,
    );
}

fn check_duration(location: &str, value: Duration, errors: &mut Vec<ValidationError>) {
    if value > MAX_DURATION {
        errors.push(ValidationError::new(
            location,
            format!("must not exceed {}s", MAX_DURATION.as_secs()),
        ));
    }
}

fn check_status(location: &str, code: u16, errors: &mut Vec<ValidationError>) {
    if StatusCode::from_u16(code).is_err() {
        errors.push(ValidationError::new(location, format!("invalid status code {}", code)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{AggregateRouteConfig, DynamicRouteConfig};
    use crate::load_balancer::Endpoint;

    fn valid_route() -> RouteConfig {
        RouteConfig {
            upstream_path_template: "/products/{id}".into(),
            downstream_path_template: "/api/products/{id}".into(),
            downstream_host_and_ports: vec![Endpoint::new("localhost", 5001)],
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        let config = GatewayConfig {
            routes: vec![valid_route()],
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut bad = valid_route();
        bad.upstream_path_template = "products".into();
        bad.downstream_host_and_ports.clear();
        bad.rate_limit = Some(RateLimitOptions {
            period: "soon".into(),
            limit: 0,
            ..Default::default()
        });

        let errors = validate_config(&GatewayConfig {
            routes: vec![bad],
            ..Default::default()
        })
        .unwrap_err();

        let locations: Vec<&str> = errors.iter().map(|e| e.location.as_str()).collect();
        assert!(locations.contains(&"routes[0].upstream_path_template"));
        assert!(locations.contains(&"routes[0]"));
        assert!(locations.contains(&"routes[0].rate_limit.period"));
        assert!(locations.contains(&"routes[0].rate_limit.limit"));
    }

    #[test]
    fn test_unknown_downstream_placeholder() {
        let mut route = valid_route();
        route.downstream_path_template = "/api/{sku}".into();
        let errors = validate_config(&GatewayConfig {
            routes: vec![route],
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("sku"));
    }

    #[test]
    fn test_duplicate_names() {
        let mut a = valid_route();
        a.name = Some("products".into());
        let b = a.clone();
        let errors = validate_config(&GatewayConfig {
            routes: vec![a, b],
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(errors[0].location, "routes[1]");
    }

    #[test]
    fn test_aggregate_keys_must_exist() {
        let mut keyed = valid_route();
        keyed.key = Some("Tom".into());
        let config = GatewayConfig {
            routes: vec![keyed],
            aggregates: vec![AggregateRouteConfig {
                upstream_path_template: "/".into(),
                route_keys: vec!["Tom".into(), "Laura".into()],
                ..Default::default()
            }],
            ..Default::default()
        };
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "aggregates[0].route_keys: no route has key 'Laura'");
    }

    #[test]
    fn test_global_checks() {
        let mut config = GatewayConfig::default();
        config.global.endpoint_unavailable_status = 42;
        config.global.downstream_http_version = "3".into();
        config.global.load_balancer = LoadBalancerOptions {
            kind: LoadBalancerKind::CookieStickySessions,
            key: Some(" ".into()),
            ..Default::default()
        };
        assert_eq!(validate_config(&config).unwrap_err().len(), 3);
    }

    #[test]
    fn test_durations_are_capped() {
        let mut route = valid_route();
        route.cache = Some(CacheOptions {
            ttl_seconds: i64::MAX as u64,
            ..Default::default()
        });
        route.qos = Some(QosOptions {
            duration_of_break_ms: u64::MAX,
            timeout_ms: Some(u64::MAX),
            ..Default::default()
        });
        route.rate_limit = Some(RateLimitOptions {
            period: "9223372036854775807s".into(),
            limit: 10,
            ..Default::default()
        });

        let mut config = GatewayConfig {
            routes: vec![route],
            ..Default::default()
        };
        config.global.load_balancer.expiry_ms = u64::MAX;
        config.dynamic_routes.push(DynamicRouteConfig {
            service_name: "orders".into(),
            rate_limit: Some(RateLimitOptions {
                period: "999999999999999999d".into(),
                limit: 10,
                ..Default::default()
            }),
            ..Default::default()
        });

        let errors = validate_config(&config).unwrap_err();
        let locations: Vec<&str> = errors.iter().map(|e| e.location.as_str()).collect();
        assert_eq!(
            locations,
            vec![
                "global.load_balancer.expiry_ms",
                "routes[0].rate_limit.period",
                "routes[0].qos.duration_of_break_ms",
                "routes[0].qos.timeout_ms",
                "routes[0].cache.ttl_seconds",
                "dynamic_routes[0].rate_limit.period",
            ]
        );
    }

    #[test]
    fn test_durations_at_cap_are_accepted() {
        let mut route = valid_route();
        route.cache = Some(CacheOptions {
            ttl_seconds: MAX_DURATION.as_secs(),
            ..Default::default()
        });
        route.rate_limit = Some(RateLimitOptions {
            period: "365d".into(),
            limit: 10,
            ..Default::default()
        });
        let config = GatewayConfig {
            routes: vec![route],
            ..Default::default()
        };
        assert!(validate_config(&config).is_ok());
    }
}
