//! Outbound transport subsystem.
//!
//! # Data Flow
//! ```text
//! pipeline (QoS guard)
//!     → Transport::send(DownstreamRequest)
//!     → hyper_client.rs (pooled hyper client, HTTP/1.1 or HTTP/2)
//!     → DownstreamResponse | TransportError
//! ```
//!
//! # Design Decisions
//! - The pipeline only sees the `Transport` trait; tests swap in an in-memory one
//! - Bodies are buffered on both sides so aggregation and caching can reuse them
//! - Timeouts are NOT applied here; the QoS guard owns the deadline and cancels
//!   the send future by dropping it

pub mod hyper_client;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Version};
use bytes::Bytes;
use thiserror::Error;
use url::Url;

pub use hyper_client::HyperTransport;

/// A fully resolved request ready to leave the gateway.
#[derive(Debug, Clone)]
pub struct DownstreamRequest {
    pub method: Method,
    pub url: Url,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl DownstreamRequest {
    /// `host:port` of the target, with the scheme's default port filled in.
    pub fn authority(&self) -> String {
        format!(
            "{}:{}",
            self.url.host_str().unwrap_or_default(),
            self.url.port_or_known_default().unwrap_or(80)
        )
    }
}

/// A buffered response, either from a downstream service or synthesized by the gateway.
#[derive(Debug, Clone)]
pub struct DownstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl DownstreamResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Builder-style header insert. Invalid values are skipped.
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Transport-level failure. Counts toward the circuit breaker.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("response body could not be read: {0}")]
    Body(String),

    #[error("unsupported downstream scheme '{0}'")]
    UnsupportedScheme(String),
}

/// Outbound dispatch contract.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Send the request and buffer the response.
    async fn send(&self, request: DownstreamRequest) -> Result<DownstreamResponse, TransportError>;
}
