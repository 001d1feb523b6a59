//! Per-request pipeline context.

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};

use crate::cache::CacheKey;
use crate::http::request::InboundRequest;
use crate::load_balancer::{Endpoint, Lease};
use crate::pipeline::state::RouteState;
use crate::pipeline::transform::TransformVars;
use crate::routing::{Placeholders, Route};
use crate::security::rate_limit::QuotaHeaders;
use crate::transport::{DownstreamRequest, DownstreamResponse};

pub const X_RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-rate-limit-limit");
pub const X_RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-rate-limit-remaining");
pub const X_RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-rate-limit-reset");

/// The matched route and its captures, as seen by collaborators.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedRoute<'a> {
    pub route: &'a Route,
    pub placeholders: &'a Placeholders,
    pub request_id: &'a str,
}

/// State threaded through the stages for one route invocation.
#[derive(Debug)]
pub struct RequestContext {
    pub request: Arc<InboundRequest>,
    pub route: Arc<Route>,
    pub placeholders: Placeholders,
    pub request_id: String,
    pub state: Arc<RouteState>,
    pub quota: Option<QuotaHeaders>,
    pub cache_key: Option<CacheKey>,
    pub candidates: Vec<Endpoint>,
    pub lease: Option<Lease>,
    pub vars: TransformVars,
    pub downstream: Option<DownstreamRequest>,
    pub response: Option<DownstreamResponse>,
}

impl RequestContext {
    pub fn new(
        request: Arc<InboundRequest>,
        route: Arc<Route>,
        placeholders: Placeholders,
        request_id: String,
        state: Arc<RouteState>,
    ) -> Self {
        Self {
            request,
            route,
            placeholders,
            request_id,
            state,
            quota: None,
            cache_key: None,
            candidates: Vec::new(),
            lease: None,
            vars: TransformVars::default(),
            downstream: None,
            response: None,
        }
    }

    pub fn resolved(&self) -> ResolvedRoute<'_> {
        ResolvedRoute {
            route: &self.route,
            placeholders: &self.placeholders,
            request_id: &self.request_id,
        }
    }

    /// Decorate the final response with per-request headers.
    pub fn finish(&self, mut response: DownstreamResponse) -> DownstreamResponse {
        if let Some(quota) = &self.quota {
            let reset = quota.reset_after.as_millis().div_ceil(1000);
            for (name, value) in [
                (X_RATE_LIMIT_LIMIT, quota.limit.to_string()),
                (X_RATE_LIMIT_REMAINING, quota.remaining.to_string()),
                (X_RATE_LIMIT_RESET, reset.to_string()),
            ] {
                if let Ok(value) = HeaderValue::from_str(&value) {
                    response.headers.insert(name, value);
                }
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::http::StatusCode;

    use crate::config::{GlobalConfig, RouteConfig};

    fn context() -> RequestContext {
        let route = Route::compile(
            &RouteConfig {
                upstream_path_template: "/a".into(),
                downstream_path_template: "/a".into(),
                downstream_host_and_ports: vec![Endpoint::new("h", 1)],
                ..Default::default()
            },
            0,
            &GlobalConfig::default(),
        )
        .unwrap();
        let state = Arc::new(RouteState::for_route(&route));
        RequestContext::new(
            Arc::new(InboundRequest::get("/a")),
            Arc::new(route),
            Placeholders::new(),
            "req-1".into(),
            state,
        )
    }

    #[test]
    fn test_quota_headers_on_finish() {
        let mut ctx = context();
        ctx.quota = Some(QuotaHeaders {
            limit: 3,
            remaining: 1,
            reset_after: Duration::from_millis(1500),
        });

        let response = ctx.finish(DownstreamResponse::new(StatusCode::OK, "ok"));
        assert_eq!(response.headers.get(X_RATE_LIMIT_LIMIT).unwrap(), "3");
        assert_eq!(response.headers.get(X_RATE_LIMIT_REMAINING).unwrap(), "1");
        assert_eq!(response.headers.get(X_RATE_LIMIT_RESET).unwrap(), "2");
    }

    #[test]
    fn test_resolved_view() {
        let ctx = context();
        let view = ctx.resolved();
        assert_eq!(view.route.id.as_str(), "/a#0");
        assert_eq!(view.request_id, "req-1");
        assert!(view.placeholders.is_empty());
    }
}
