//! Candidate endpoint resolution for a matched route.

use std::sync::Arc;

use axum::http::StatusCode;

use crate::discovery::ServiceDiscovery;
use crate::error::{GatewayError, GatewayResult};
use crate::load_balancer::Endpoint;
use crate::routing::Route;

/// Produces a route's candidate endpoints.
#[derive(Debug, Clone)]
pub struct DownstreamResolver {
    discovery: Arc<dyn ServiceDiscovery>,
    unavailable_status: StatusCode,
}

impl DownstreamResolver {
    pub fn new(discovery: Arc<dyn ServiceDiscovery>, unavailable_status: StatusCode) -> Self {
        Self {
            discovery,
            unavailable_status,
        }
    }

    /// Status used when a route has nothing to send to.
    pub fn unavailable_status(&self) -> StatusCode {
        self.unavailable_status
    }

    /// Static endpoints, or the discovery snapshot for the route's service.
    pub async fn resolve(&self, route: &Route) -> GatewayResult<Vec<Endpoint>> {
        let candidates = match &route.service_name {
            Some(service) => self.discovery.resolve(service).await.map_err(|e| {
                tracing::warn!(route = %route.id, service = %service, error = %e, "Service discovery failed");
                self.unavailable(route, e.to_string())
            })?,
            None => route.endpoints.clone(),
        };

        if candidates.is_empty() {
            tracing::warn!(route = %route.id, "No downstream endpoints available");
            return Err(self.unavailable(route, "no endpoints".to_string()));
        }
        Ok(candidates)
    }

    fn unavailable(&self, route: &Route, reason: String) -> GatewayError {
        GatewayError::EndpointUnavailable {
            route: route.id.to_string(),
            reason,
            status: self.unavailable_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GlobalConfig, RouteConfig};
    use crate::discovery::InMemoryServiceDiscovery;

    fn route(config: RouteConfig) -> Route {
        Route::compile(&config, 0, &GlobalConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_static_endpoints() {
        let resolver = DownstreamResolver::new(
            Arc::new(InMemoryServiceDiscovery::new()),
            StatusCode::SERVICE_UNAVAILABLE,
        );
        let route = route(RouteConfig {
            upstream_path_template: "/a".into(),
            downstream_path_template: "/a".into(),
            downstream_host_and_ports: vec![Endpoint::new("h", 1)],
            ..Default::default()
        });

        assert_eq!(resolver.resolve(&route).await.unwrap(), vec![Endpoint::new("h", 1)]);
    }

    #[tokio::test]
    async fn test_discovery_empty_and_unknown() {
        let discovery = Arc::new(InMemoryServiceDiscovery::new());
        let resolver = DownstreamResolver::new(discovery.clone(), StatusCode::NOT_FOUND);
        let route = route(RouteConfig {
            upstream_path_template: "/a".into(),
            downstream_path_template: "/a".into(),
            service_name: Some("catalog".into()),
            ..Default::default()
        });

        let unknown = resolver.resolve(&route).await.unwrap_err();
        assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

        discovery.publish("catalog", Vec::new());
        let empty = resolver.resolve(&route).await.unwrap_err();
        assert!(matches!(empty, GatewayError::EndpointUnavailable { .. }));

        discovery.publish("catalog", vec![Endpoint::new("c1", 80)]);
        assert_eq!(resolver.resolve(&route).await.unwrap().len(), 1);
    }
}
