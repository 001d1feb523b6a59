//! Gateway entry point and snapshot publication.
//!
//! # Data Flow
//! ```text
//! GatewayConfig
//!     → validate_config
//!     → GatewaySnapshot::build (RouteTable + RouteStateRegistry + resolver)
//!     → ArcSwap::store (readers keep the snapshot they started with)
//!
//! Gateway::handle(InboundRequest)
//!     → snapshot.load_full()
//!     → Dispatcher::dispatch
//!     → DownstreamResponse (errors rendered through GatewayError::to_response)
//! ```
//!
//! # Design Decisions
//! - A reload replaces the whole snapshot; per-route state starts fresh
//! - A rejected reload leaves the running snapshot untouched
//! - In-flight requests finish against the snapshot they matched

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::http::StatusCode;
use uuid::Uuid;

use crate::config::{validate_config, ConfigError, GatewayConfig, GlobalConfig, ValidationError};
use crate::discovery::{DownstreamResolver, ServiceDiscovery, StaticServiceDiscovery};
use crate::error::{GatewayError, GatewayResult};
use crate::http::request::InboundRequest;
use crate::observability::metrics;
use crate::pipeline::{AggregatorRegistry, Dispatcher, ResponseAggregator, RouteStateRegistry};
use crate::routing::{RouteMatch, RouteTable};
use crate::transport::{DownstreamResponse, HyperTransport, Transport};

/// Header consulted for an inbound request id when no key is configured.
pub const DEFAULT_REQUEST_ID_HEADER: &str = "x-request-id";

/// Everything derived from one configuration.
#[derive(Debug)]
pub struct GatewaySnapshot {
    pub version: u64,
    pub table: RouteTable,
    pub states: RouteStateRegistry,
    pub resolver: DownstreamResolver,
    pub global: GlobalConfig,
}

impl GatewaySnapshot {
    fn build(
        config: &GatewayConfig,
        version: u64,
        discovery: Option<&Arc<dyn ServiceDiscovery>>,
        aggregators: &AggregatorRegistry,
    ) -> Result<Self, ConfigError> {
        validate_config(config).map_err(ConfigError::Validation)?;

        let unknown: Vec<ValidationError> = config
            .aggregates
            .iter()
            .enumerate()
            .filter_map(|(i, a)| {
                a.aggregator
                    .as_deref()
                    .filter(|name| !aggregators.contains(name))
                    .map(|name| ValidationError {
                        location: format!("aggregates[{}].aggregator", i),
                        message: format!("no aggregator registered as '{}'", name),
                    })
            })
            .collect();
        if !unknown.is_empty() {
            return Err(ConfigError::Validation(unknown));
        }

        let table = RouteTable::build(config)?;
        let states = RouteStateRegistry::build(&table);

        let discovery = match discovery {
            Some(discovery) => discovery.clone(),
            None => Arc::new(StaticServiceDiscovery::from_config(&config.services)) as Arc<dyn ServiceDiscovery>,
        };
        let unavailable = StatusCode::from_u16(config.global.endpoint_unavailable_status)
            .unwrap_or(StatusCode::SERVICE_UNAVAILABLE);

        Ok(Self {
            version,
            table,
            states,
            resolver: DownstreamResolver::new(discovery, unavailable),
            global: config.global.clone(),
        })
    }
}

/// Builder for a [`Gateway`].
pub struct GatewayBuilder {
    config: GatewayConfig,
    transport: Option<Arc<dyn Transport>>,
    discovery: Option<Arc<dyn ServiceDiscovery>>,
    aggregators: AggregatorRegistry,
}

impl GatewayBuilder {
    /// Outbound transport. Defaults to [`HyperTransport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// External service discovery. Defaults to the `[[services]]` registry of each config.
    pub fn discovery(mut self, discovery: Arc<dyn ServiceDiscovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// Register an aggregator that aggregates can name.
    pub fn aggregator(mut self, name: impl Into<String>, aggregator: Arc<dyn ResponseAggregator>) -> Self {
        self.aggregators.register(name, aggregator);
        self
    }

    pub fn build(self) -> Result<Gateway, ConfigError> {
        let snapshot = GatewaySnapshot::build(&self.config, 1, self.discovery.as_ref(), &self.aggregators)?;
        tracing::info!(
            version = snapshot.version,
            routes = snapshot.table.len(),
            "Gateway configuration loaded"
        );

        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(HyperTransport::default()));

        Ok(Gateway {
            snapshot: ArcSwap::from_pointee(snapshot),
            dispatcher: Dispatcher::new(transport, Arc::new(self.aggregators)),
            discovery: self.discovery,
            version: AtomicU64::new(1),
        })
    }
}

/// The request-dispatch core.
pub struct Gateway {
    snapshot: ArcSwap<GatewaySnapshot>,
    dispatcher: Dispatcher,
    discovery: Option<Arc<dyn ServiceDiscovery>>,
    version: AtomicU64,
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder {
            config,
            transport: None,
            discovery: None,
            aggregators: AggregatorRegistry::default(),
        }
    }

    pub fn new(config: GatewayConfig) -> Result<Self, ConfigError> {
        Self::builder(config).build()
    }

    /// The currently published snapshot.
    pub fn snapshot(&self) -> Arc<GatewaySnapshot> {
        self.snapshot.load_full()
    }

    pub fn version(&self) -> u64 {
        self.snapshot.load().version
    }

    /// Match a request without dispatching it.
    pub fn resolve(&self, request: &InboundRequest) -> GatewayResult<RouteMatch> {
        self.snapshot.load().table.resolve(request)
    }

    /// Dispatch a request, surfacing gateway failures as errors.
    pub async fn dispatch(&self, request: InboundRequest) -> GatewayResult<DownstreamResponse> {
        let snapshot = self.snapshot();
        let request_id = request_id(&snapshot.global, &request);
        self.dispatcher
            .dispatch(snapshot, Arc::new(request), &request_id)
            .await
    }

    /// Dispatch a request and render any failure as a response.
    pub async fn handle(&self, request: InboundRequest) -> DownstreamResponse {
        let snapshot = self.snapshot();
        let request_id = request_id(&snapshot.global, &request);
        let started = std::time::Instant::now();
        let method = request.method.clone();
        let path = request.path.clone();

        match self
            .dispatcher
            .dispatch(snapshot, Arc::new(request), &request_id)
            .await
        {
            Ok(response) => {
                tracing::debug!(
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    status = response.status.as_u16(),
                    "Request completed"
                );
                response
            }
            Err(e) => {
                if let GatewayError::RouteNotFound { .. } = e {
                    tracing::warn!(request_id = %request_id, method = %method, path = %path, "No route matched");
                    metrics::record_request("none", method.as_str(), e.status().as_u16(), started);
                } else {
                    tracing::debug!(
                        request_id = %request_id,
                        kind = e.kind(),
                        error = %e,
                        "Request failed"
                    );
                }
                e.to_response()
            }
        }
    }

    /// Validate `config` and publish it. The running snapshot survives a failure.
    pub fn reload(&self, config: GatewayConfig) -> Result<u64, ConfigError> {
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        match GatewaySnapshot::build(&config, version, self.discovery.as_ref(), self.dispatcher.aggregators()) {
            Ok(snapshot) => {
                let routes = snapshot.table.len();
                self.snapshot.store(Arc::new(snapshot));
                metrics::record_config_reload(true);
                tracing::info!(version, routes, "Configuration reloaded");
                Ok(version)
            }
            Err(e) => {
                metrics::record_config_reload(false);
                tracing::error!(error = %e, "Configuration rejected, keeping current snapshot");
                Err(e)
            }
        }
    }

    /// Clear every route cache tagged with `region`.
    pub fn clear_cache_region(&self, region: &str) -> usize {
        let cleared = self.snapshot.load().states.clear_cache_region(region);
        tracing::info!(region = %region, caches = cleared, "Cache region cleared");
        cleared
    }

    /// Drop expired per-route bookkeeping.
    pub fn purge_expired(&self) {
        self.snapshot.load().states.purge_expired();
    }
}

fn request_id(global: &GlobalConfig, request: &InboundRequest) -> String {
    let key = global
        .request_id_key
        .as_deref()
        .unwrap_or(DEFAULT_REQUEST_ID_HEADER);
    request
        .header_value(key)
        .or_else(|| request.header_value(DEFAULT_REQUEST_ID_HEADER))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AggregateRouteConfig, RouteConfig};
    use crate::load_balancer::Endpoint;

    fn config(template: &str) -> GatewayConfig {
        GatewayConfig {
            routes: vec![RouteConfig {
                upstream_path_template: template.into(),
                downstream_path_template: "/".into(),
                downstream_host_and_ports: vec![Endpoint::new("localhost", 9000)],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_reload_publishes_new_snapshot() {
        let gateway = Gateway::new(config("/a")).unwrap();
        assert_eq!(gateway.version(), 1);
        assert!(gateway.resolve(&InboundRequest::get("/a")).is_ok());

        let version = gateway.reload(config("/b")).unwrap();
        assert_eq!(version, 2);
        assert!(gateway.resolve(&InboundRequest::get("/a")).is_err());
        assert!(gateway.resolve(&InboundRequest::get("/b")).is_ok());
    }

    #[test]
    fn test_rejected_reload_keeps_snapshot() {
        let gateway = Gateway::new(config("/a")).unwrap();
        assert!(gateway.reload(config("no-slash")).is_err());
        assert_eq!(gateway.version(), 1);
        assert!(gateway.resolve(&InboundRequest::get("/a")).is_ok());
    }

    #[test]
    fn test_unknown_aggregator_rejected() {
        let mut config = config("/a");
        config.routes[0].key = Some("a".into());
        config.aggregates.push(AggregateRouteConfig {
            upstream_path_template: "/all".into(),
            route_keys: vec!["a".into()],
            aggregator: Some("custom".into()),
            ..Default::default()
        });
        assert!(matches!(Gateway::new(config), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_request_id_reuse_and_generation() {
        let mut global = GlobalConfig::default();
        assert_eq!(
            request_id(&global, &InboundRequest::get("/").header("x-request-id", "abc")),
            "abc"
        );

        global.request_id_key = Some("OcRequestId".into());
        assert_eq!(
            request_id(&global, &InboundRequest::get("/").header("OcRequestId", "xyz")),
            "xyz"
        );
        let generated = request_id(&global, &InboundRequest::get("/"));
        assert!(Uuid::parse_str(&generated).is_ok());
    }
}
