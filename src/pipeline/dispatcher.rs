//! Stage dispatcher.
//!
//! # Stages
//! ```text
//! Authorize → RateLimit → CacheLookup → Resolve → Balance
//!     → BuildRequest → Send → TransformResponse → CacheStore
//! ```
//! A stage either continues, short-circuits with a response already in the
//! context (cache hit), or fails with a `GatewayError` (rate limited, open
//! circuit, no endpoints). Aggregate routes run this list once per member,
//! concurrently.

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::cache::{is_cacheable, CacheKey};
use crate::error::{GatewayError, GatewayResult};
use crate::gateway::GatewaySnapshot;
use crate::http::request::InboundRequest;
use crate::observability::metrics;
use crate::pipeline::aggregator::{AggregatePart, AggregatorRegistry};
use crate::pipeline::context::RequestContext;
use crate::pipeline::transform::{TransformError, TransformVars};
use crate::resilience::guarded_call;
use crate::routing::downstream::{base_url, build_url};
use crate::routing::{AggregateRoute, Placeholders, Route, RouteTarget};
use crate::security::headers::{apply_forwarding_headers, strip_hop_by_hop};
use crate::security::rate_limit::RateLimitDecision;
use crate::transport::{DownstreamRequest, DownstreamResponse, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Authorize,
    RateLimit,
    CacheLookup,
    Resolve,
    Balance,
    BuildRequest,
    Send,
    TransformResponse,
    CacheStore,
}

impl Stage {
    pub const ORDER: [Stage; 9] = [
        Stage::Authorize,
        Stage::RateLimit,
        Stage::CacheLookup,
        Stage::Resolve,
        Stage::Balance,
        Stage::BuildRequest,
        Stage::Send,
        Stage::TransformResponse,
        Stage::CacheStore,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Authorize => "authorize",
            Stage::RateLimit => "rate_limit",
            Stage::CacheLookup => "cache_lookup",
            Stage::Resolve => "resolve",
            Stage::Balance => "balance",
            Stage::BuildRequest => "build_request",
            Stage::Send => "send",
            Stage::TransformResponse => "transform_response",
            Stage::CacheStore => "cache_store",
        }
    }
}

/// What the pipeline does after a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// The context already holds the final response.
    ShortCircuit,
}

/// Aborts the task when the aggregate request is dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Runs requests through the stage list.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    aggregators: Arc<AggregatorRegistry>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, aggregators: Arc<AggregatorRegistry>) -> Self {
        Self {
            transport,
            aggregators,
        }
    }

    pub fn aggregators(&self) -> &AggregatorRegistry {
        &self.aggregators
    }

    /// Match the request and run it through its route or aggregate.
    pub async fn dispatch(
        &self,
        snapshot: Arc<GatewaySnapshot>,
        request: Arc<InboundRequest>,
        request_id: &str,
    ) -> GatewayResult<DownstreamResponse> {
        let matched = snapshot.table.resolve(&request)?;
        match matched.target {
            RouteTarget::Route(route) => {
                self.run_route(&snapshot, route, matched.placeholders, request, request_id)
                    .await
            }
            RouteTarget::Aggregate(aggregate) => {
                self.run_aggregate(snapshot, aggregate, matched.placeholders, request, request_id)
                    .await
            }
        }
    }

    /// Run every stage for one route and record the outcome.
    pub async fn run_route(
        &self,
        snapshot: &GatewaySnapshot,
        route: Arc<Route>,
        placeholders: Placeholders,
        request: Arc<InboundRequest>,
        request_id: &str,
    ) -> GatewayResult<DownstreamResponse> {
        let started = std::time::Instant::now();
        let state = snapshot.states.state_for(&route);
        let mut ctx = RequestContext::new(request, route, placeholders, request_id.to_string(), state);

        let result = self.run_stages(snapshot, &mut ctx).await;
        let status = match &result {
            Ok(response) => response.status,
            Err(e) => e.status(),
        };
        metrics::record_request(ctx.route.id.as_str(), ctx.request.method.as_str(), status.as_u16(), started);

        result.map(|response| ctx.finish(response))
    }

    async fn run_stages(&self, snapshot: &GatewaySnapshot, ctx: &mut RequestContext) -> GatewayResult<DownstreamResponse> {
        for stage in Stage::ORDER {
            let flow = match stage {
                Stage::Authorize => authorize(ctx)?,
                Stage::RateLimit => rate_limit(ctx)?,
                Stage::CacheLookup => cache_lookup(ctx),
                Stage::Resolve => {
                    ctx.candidates = snapshot.resolver.resolve(&ctx.route).await?;
                    if ctx.route.dynamic {
                        ctx.route = snapshot.table.remember_dynamic(&ctx.route);
                        ctx.state = snapshot.states.remember(&ctx.route, ctx.state.clone());
                    }
                    Flow::Continue
                }
                Stage::Balance => balance(snapshot, ctx)?,
                Stage::BuildRequest => build_request(snapshot, ctx)?,
                Stage::Send => self.send(ctx).await?,
                Stage::TransformResponse => transform_response(ctx),
                Stage::CacheStore => cache_store(ctx),
            };
            if flow == Flow::ShortCircuit {
                tracing::debug!(
                    request_id = %ctx.request_id,
                    route = %ctx.route.id,
                    stage = stage.name(),
                    "Pipeline short-circuited"
                );
                break;
            }
        }

        ctx.response
            .take()
            .ok_or_else(|| GatewayError::Internal("pipeline produced no response".to_string()))
    }

    async fn send(&self, ctx: &mut RequestContext) -> GatewayResult<Flow> {
        let downstream = ctx
            .downstream
            .take()
            .ok_or_else(|| GatewayError::Internal("no downstream request built".to_string()))?;

        tracing::debug!(
            request_id = %ctx.request_id,
            route = %ctx.route.id,
            method = %downstream.method,
            url = %downstream.url,
            "Forwarding request"
        );

        let outcome = guarded_call(
            ctx.route.id.as_str(),
            ctx.route.qos.timeout,
            ctx.state.breaker.as_ref(),
            self.transport.send(downstream),
        )
        .await;
        // Releases the in-flight count whatever the outcome.
        ctx.lease = None;

        let mut response = outcome?;
        strip_hop_by_hop(&mut response.headers);
        ctx.response = Some(response);
        Ok(Flow::Continue)
    }

    async fn run_aggregate(
        &self,
        snapshot: Arc<GatewaySnapshot>,
        aggregate: Arc<AggregateRoute>,
        placeholders: Placeholders,
        request: Arc<InboundRequest>,
        request_id: &str,
    ) -> GatewayResult<DownstreamResponse> {
        let started = std::time::Instant::now();

        let mut tasks: Vec<AbortOnDrop<GatewayResult<DownstreamResponse>>> = aggregate
            .members
            .iter()
            .map(|(_, route)| {
                let dispatcher = self.clone();
                let snapshot = snapshot.clone();
                let route = route.clone();
                let placeholders = placeholders.clone();
                let request = request.clone();
                let request_id = request_id.to_string();
                AbortOnDrop(tokio::spawn(async move {
                    dispatcher
                        .run_route(&snapshot, route, placeholders, request, &request_id)
                        .await
                }))
            })
            .collect();

        let joined = join_all(tasks.iter_mut().map(|task| &mut task.0)).await;

        let parts: Vec<AggregatePart> = aggregate
            .members
            .iter()
            .zip(joined)
            .map(|((key, _), joined)| {
                let outcome = joined
                    .unwrap_or_else(|e| Err(GatewayError::Internal(format!("sub-request task failed: {}", e))));
                let ok = matches!(&outcome, Ok(response) if response.is_success());
                metrics::record_aggregate_part(aggregate.id.as_str(), ok);
                if let Err(e) = &outcome {
                    tracing::warn!(
                        request_id = %request_id,
                        aggregate = %aggregate.id,
                        key = %key,
                        error = %e,
                        "Aggregate part failed"
                    );
                }
                AggregatePart {
                    key: key.clone(),
                    outcome,
                }
            })
            .collect();

        let result = if parts.iter().all(|p| p.outcome.is_err()) {
            match parts.into_iter().find_map(|p| p.outcome.err()) {
                Some(first) => Err(first),
                None => Err(GatewayError::Internal("aggregate has no members".to_string())),
            }
        } else {
            let aggregator = self.aggregators.get(aggregate.aggregator.as_deref());
            Ok(aggregator.aggregate(&parts))
        };

        let status = match &result {
            Ok(response) => response.status,
            Err(e) => e.status(),
        };
        metrics::record_request(aggregate.id.as_str(), request.method.as_str(), status.as_u16(), started);
        result
    }
}

fn authorize(ctx: &RequestContext) -> GatewayResult<Flow> {
    let route = &ctx.route;
    let needs_principal = route.authentication_required || !route.claims_requirement.is_empty();
    let principal = match (&ctx.request.principal, needs_principal) {
        (Some(principal), _) => principal,
        (None, true) => {
            tracing::warn!(request_id = %ctx.request_id, route = %route.id, "Unauthenticated request rejected");
            return Err(GatewayError::Unauthenticated);
        }
        (None, false) => return Ok(Flow::Continue),
    };

    for (claim, required) in &route.claims_requirement {
        if !principal.has_claim(claim, required) {
            tracing::warn!(
                request_id = %ctx.request_id,
                route = %route.id,
                claim = %claim,
                "Required claim missing"
            );
            return Err(GatewayError::Unauthorized(format!("claim '{}' does not match", claim)));
        }
    }
    Ok(Flow::Continue)
}

fn rate_limit(ctx: &mut RequestContext) -> GatewayResult<Flow> {
    let Some(limiter) = &ctx.state.limiter else {
        return Ok(Flow::Continue);
    };

    let client = limiter.client_id(&ctx.request);
    match limiter.check(&client, Instant::now()) {
        RateLimitDecision::Allowed(quota) => {
            ctx.quota = quota;
            Ok(Flow::Continue)
        }
        RateLimitDecision::Rejected(rejection) => {
            tracing::warn!(
                request_id = %ctx.request_id,
                route = %ctx.route.id,
                client = %client,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(ctx.route.id.as_str());
            Err(GatewayError::RateLimited {
                route: ctx.route.id.to_string(),
                client,
                rejection,
            })
        }
    }
}

fn cache_lookup(ctx: &mut RequestContext) -> Flow {
    let (Some(cache), Some(options)) = (&ctx.state.cache, &ctx.route.cache) else {
        return Flow::Continue;
    };
    if ctx.request.method != Method::GET && ctx.request.method != Method::HEAD {
        return Flow::Continue;
    }

    let key = CacheKey::for_request(&ctx.request, options);
    match cache.try_get(&key, Instant::now()) {
        Some(hit) => {
            tracing::debug!(request_id = %ctx.request_id, route = %ctx.route.id, "Cache hit");
            metrics::record_cache_lookup(ctx.route.id.as_str(), true);
            ctx.response = Some(hit);
            Flow::ShortCircuit
        }
        None => {
            tracing::debug!(request_id = %ctx.request_id, route = %ctx.route.id, "Cache miss");
            metrics::record_cache_lookup(ctx.route.id.as_str(), false);
            ctx.cache_key = Some(key);
            Flow::Continue
        }
    }
}

fn balance(snapshot: &GatewaySnapshot, ctx: &mut RequestContext) -> GatewayResult<Flow> {
    let lease = ctx
        .state
        .balancer
        .lease(&ctx.candidates, &ctx.request)
        .ok_or_else(|| GatewayError::EndpointUnavailable {
            route: ctx.route.id.to_string(),
            reason: "load balancer returned no endpoint".to_string(),
            status: snapshot.resolver.unavailable_status(),
        })?;

    tracing::debug!(
        request_id = %ctx.request_id,
        route = %ctx.route.id,
        endpoint = %lease.endpoint(),
        "Endpoint selected"
    );
    ctx.lease = Some(lease);
    Ok(Flow::Continue)
}

fn build_request(snapshot: &GatewaySnapshot, ctx: &mut RequestContext) -> GatewayResult<Flow> {
    let route = &ctx.route;
    let request = &ctx.request;
    let endpoint = ctx
        .lease
        .as_ref()
        .map(|lease| lease.endpoint().clone())
        .ok_or_else(|| GatewayError::Internal("no endpoint leased".to_string()))?;

    let principal = request.principal.as_ref();
    let claim_queries = route.transforms.claim_queries(principal).map_err(claim_error)?;
    let claim_headers = route.transforms.claim_headers(principal).map_err(claim_error)?;

    let path = route.downstream.render_path(&ctx.placeholders);
    let query = route
        .downstream
        .render_query(request.query.as_deref(), &ctx.placeholders);
    let url = build_url(&route.downstream_scheme, &endpoint, &path, query.as_deref(), &claim_queries)?;

    let mut headers = request.headers.clone();
    apply_forwarding_headers(
        &mut headers,
        request.remote_addr.map(|addr| addr.ip()),
        &request.scheme,
        request.host.as_deref(),
    );
    if let Some(key) = &snapshot.global.request_id_key {
        match (
            axum::http::HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&ctx.request_id),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::debug!(key = %key, "Request id header not representable"),
        }
    }
    for (name, value) in claim_headers {
        headers.insert(name, value);
    }

    let vars = TransformVars {
        remote_ip: request.remote_addr.map(|addr| addr.ip().to_string()),
        base_url: snapshot.global.base_url.clone(),
        downstream_base_url: Some(base_url(&route.downstream_scheme, &endpoint)),
        upstream_host: request.host.clone(),
    };
    for rule in &route.transforms.upstream_headers {
        rule.apply(&mut headers, &vars);
    }

    ctx.downstream = Some(DownstreamRequest {
        method: request.method.clone(),
        url,
        version: route.downstream_version,
        headers,
        body: request.body.clone(),
    });
    ctx.vars = vars;
    Ok(Flow::Continue)
}

fn claim_error(e: TransformError) -> GatewayError {
    GatewayError::Unauthorized(e.to_string())
}

fn transform_response(ctx: &mut RequestContext) -> Flow {
    if let Some(response) = ctx.response.as_mut() {
        for rule in &ctx.route.transforms.downstream_headers {
            rule.apply(&mut response.headers, &ctx.vars);
        }
    }
    Flow::Continue
}

fn cache_store(ctx: &mut RequestContext) -> Flow {
    let (Some(cache), Some(key), Some(response)) = (&ctx.state.cache, ctx.cache_key.take(), &ctx.response) else {
        return Flow::Continue;
    };
    if is_cacheable(&ctx.request.method, response.status) {
        cache.store(key, response.clone(), Instant::now());
    }
    Flow::Continue
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        let names: Vec<&str> = Stage::ORDER.iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "authorize",
                "rate_limit",
                "cache_lookup",
                "resolve",
                "balance",
                "build_request",
                "send",
                "transform_response",
                "cache_store",
            ]
        );
    }

    #[test]
    fn test_claim_errors_are_forbidden() {
        let err = claim_error(TransformError::MissingClaim("sub".into()));
        assert_eq!(err.status(), axum::http::StatusCode::FORBIDDEN);
    }
}
