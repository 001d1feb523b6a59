//! hyper-based transport.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Uri, Version};
use bytes::Bytes;
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};

use crate::transport::{DownstreamRequest, DownstreamResponse, Transport, TransportError};

/// Pooled hyper client with one pool per HTTP version.
#[derive(Debug, Clone)]
pub struct HyperTransport {
    http1: Client<HttpConnector, Body>,
    http2: Client<HttpConnector, Body>,
    max_response_bytes: usize,
}

impl HyperTransport {
    pub fn new(max_response_bytes: usize) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_nodelay(true);

        let http1 = Client::builder(TokioExecutor::new()).build(connector.clone());
        let http2 = Client::builder(TokioExecutor::new())
            .http2_only(true)
            .build(connector);

        Self {
            http1,
            http2,
            max_response_bytes,
        }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new(16 * 1024 * 1024)
    }
}

#[async_trait]
impl Transport for HyperTransport {
    async fn send(&self, request: DownstreamRequest) -> Result<DownstreamResponse, TransportError> {
        // TLS is terminated elsewhere; only plain HTTP leaves this client.
        if request.url.scheme() != "http" {
            return Err(TransportError::UnsupportedScheme(request.url.scheme().to_string()));
        }

        let uri: Uri = request
            .url
            .as_str()
            .parse()
            .map_err(|e: axum::http::uri::InvalidUri| TransportError::Request(e.to_string()))?;

        let http2 = request.version == Version::HTTP_2;
        let mut builder = Request::builder()
            .method(request.method)
            .uri(uri)
            .version(if http2 { Version::HTTP_2 } else { Version::HTTP_11 });
        if let Some(headers) = builder.headers_mut() {
            headers.extend(request.headers);
        }
        let outbound = builder
            .body(Body::from(request.body))
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let client = if http2 { &self.http2 } else { &self.http1 };
        let response = client.request(outbound).await.map_err(|e| {
            if e.is_connect() {
                TransportError::Connect(e.to_string())
            } else {
                TransportError::Request(e.to_string())
            }
        })?;

        let (parts, body) = response.into_parts();
        let body = read_body(body, self.max_response_bytes).await?;

        Ok(DownstreamResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

/// Collect a downstream body, failing once it exceeds `limit` bytes.
async fn read_body(body: Incoming, limit: usize) -> Result<Bytes, TransportError> {
    axum::body::to_bytes(Body::new(body), limit)
        .await
        .map_err(|e| TransportError::Body(e.to_string()))
}
