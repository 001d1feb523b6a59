//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use api_gateway::config::{GatewayConfig, RouteConfig};
use api_gateway::load_balancer::Endpoint;
use api_gateway::transport::{DownstreamRequest, DownstreamResponse, Transport, TransportError};
use async_trait::async_trait;
use axum::http::StatusCode;
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// What the mock does for one downstream authority.
#[derive(Debug, Clone)]
pub enum Behavior {
    Respond(u16, String),
    /// Respond with the downstream path and query as the body.
    Echo,
    Fail,
    Delay(Duration, u16, String),
}

/// In-memory transport keyed by `host:port`.
#[derive(Debug, Default)]
pub struct MockTransport {
    behaviors: Mutex<HashMap<String, Behavior>>,
    calls: Mutex<Vec<DownstreamRequest>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set(&self, authority: &str, behavior: Behavior) {
        self.behaviors.lock().insert(authority.to_string(), behavior);
    }

    pub fn respond(&self, authority: &str, status: u16, body: &str) {
        self.set(authority, Behavior::Respond(status, body.to_string()));
    }

    pub fn fail(&self, authority: &str) {
        self.set(authority, Behavior::Fail);
    }

    pub fn calls(&self) -> Vec<DownstreamRequest> {
        self.calls.lock().clone()
    }

    pub fn calls_to(&self, authority: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.authority() == authority).count()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: DownstreamRequest) -> Result<DownstreamResponse, TransportError> {
        let authority = request.authority();
        let behavior = self.behaviors.lock().get(&authority).cloned();
        let path = match request.url.query() {
            Some(q) => format!("{}?{}", request.url.path(), q),
            None => request.url.path().to_string(),
        };
        self.calls.lock().push(request);

        match behavior {
            Some(Behavior::Respond(status, body)) => Ok(response(status, body)),
            Some(Behavior::Echo) => Ok(response(200, path)),
            Some(Behavior::Delay(delay, status, body)) => {
                tokio::time::sleep(delay).await;
                Ok(response(status, body))
            }
            Some(Behavior::Fail) => Err(TransportError::Connect(format!("{} refused", authority))),
            None => Err(TransportError::Connect(format!("{} unknown", authority))),
        }
    }
}

fn response(status: u16, body: String) -> DownstreamResponse {
    DownstreamResponse::new(StatusCode::from_u16(status).unwrap(), body)
}

/// A route forwarding `template` to `/` on the given endpoints.
pub fn route(name: &str, template: &str, endpoints: &[(&str, u16)]) -> RouteConfig {
    RouteConfig {
        name: Some(name.to_string()),
        upstream_path_template: template.to_string(),
        downstream_path_template: "/".to_string(),
        downstream_host_and_ports: endpoints
            .iter()
            .map(|(host, port)| Endpoint::new(*host, *port))
            .collect(),
        ..Default::default()
    }
}

pub fn config(routes: Vec<RouteConfig>) -> GatewayConfig {
    GatewayConfig {
        routes,
        ..Default::default()
    }
}

/// Start a TCP backend on an ephemeral port that answers every request with `body`.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    start_programmable_backend(move || async move { (200, body.to_string()) }).await
}

/// Start a TCP backend whose status and body come from `f`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        // Read the request head before answering.
                        let mut buf = Vec::with_capacity(1024);
                        let mut chunk = [0u8; 1024];
                        loop {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => {
                                    buf.extend_from_slice(&chunk[..n]);
                                    if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                                        break;
                                    }
                                }
                            }
                        }

                        let (status, body) = f().await;
                        let reason = StatusCode::from_u16(status)
                            .ok()
                            .and_then(|s| s.canonical_reason())
                            .unwrap_or("OK");
                        let response = format!(
                            "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status,
                            reason,
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}
