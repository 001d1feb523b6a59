//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with a single catch-all handler
//! - Wire up middleware (request id, tracing)
//! - Convert inbound requests and hand them to the gateway core
//! - Apply configuration updates while serving
//! - Periodically purge expired per-route state

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{body::Body, extract::State, http::Request, response::IntoResponse, Router};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::gateway::Gateway;
use crate::http::request::InboundRequest;

/// How often expired counters, cache entries and sticky sessions are swept.
pub const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub max_body_bytes: usize,
}

/// HTTP front door for the gateway.
pub struct HttpServer {
    router: Router,
    gateway: Arc<Gateway>,
}

impl HttpServer {
    pub fn new(gateway: Arc<Gateway>, max_body_bytes: usize) -> Self {
        let state = AppState {
            gateway: gateway.clone(),
            max_body_bytes,
        };
        Self {
            router: Self::build_router(state),
            gateway,
        }
    }

    /// Build the Axum router with all middleware layers.
    pub fn build_router(state: AppState) -> Router {
        Router::new().fallback(gateway_handler).with_state(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve until `shutdown` fires, applying every config received on `config_updates`.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reloader = {
            let gateway = self.gateway.clone();
            tokio::spawn(async move {
                while let Some(config) = config_updates.recv().await {
                    // Failures are logged by the gateway; the old snapshot stays.
                    let _ = gateway.reload(config);
                }
            })
        };

        let purger = {
            let gateway = self.gateway.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(PURGE_INTERVAL);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    gateway.purge_expired();
                }
            })
        };

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await;

        reloader.abort();
        purger.abort();
        tracing::info!("HTTP server stopped");
        served
    }
}

/// Catch-all handler: every request goes through the gateway core.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> impl IntoResponse {
    match InboundRequest::from_http(request, state.max_body_bytes).await {
        Ok(inbound) => state.gateway.handle(inbound).await.into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Inbound request rejected");
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_unmatched_request_is_404_with_request_id() {
        let gateway = Arc::new(Gateway::new(GatewayConfig::default()).unwrap());
        let router = HttpServer::new(gateway, 1024).router();

        let response = router
            .oneshot(Request::builder().uri("/nowhere").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_oversized_body_is_413() {
        let gateway = Arc::new(Gateway::new(GatewayConfig::default()).unwrap());
        let router = HttpServer::new(gateway, 4).router();

        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/upload")
                    .body(Body::from("too large"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
