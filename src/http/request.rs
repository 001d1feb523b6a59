//! Inbound request model.
//!
//! # Responsibilities
//! - Capture everything the pipeline needs from the client request
//!   (method, path, query, multi-value headers, host, remote address, body)
//! - Carry the pre-authenticated principal placed in request extensions by an
//!   upstream authentication layer
//! - Enforce the body size limit while buffering
//!
//! # Design Decisions
//! - The body is buffered once so aggregate fan-out and content hashing can share it
//! - The struct is cheap to share behind an `Arc` across sub-dispatches

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request};
use bytes::Bytes;

use crate::error::{GatewayError, GatewayResult};

/// An already-authenticated caller, as produced by an external auth layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    /// Claims in issue order. The same claim type may appear more than once.
    pub claims: Vec<(String, String)>,
}

impl Principal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.push((name.into(), value.into()));
        self
    }

    /// First value of the named claim.
    pub fn claim(&self, name: &str) -> Option<&str> {
        self.claims
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// True when any value of the named claim equals `value`.
    pub fn has_claim(&self, name: &str, value: &str) -> bool {
        self.claims.iter().any(|(n, v)| n == name && v == value)
    }
}

/// A buffered inbound request.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Host without port, if the client sent one.
    pub host: Option<String>,
    /// Scheme the client used to reach the gateway.
    pub scheme: String,
    pub remote_addr: Option<SocketAddr>,
    pub principal: Option<Principal>,
}

impl InboundRequest {
    /// Build a request from a method and a path with optional `?query`.
    pub fn new(method: Method, path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (path_and_query.to_string(), None),
        };
        Self {
            method,
            path: if path.is_empty() { "/".to_string() } else { path },
            query,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            host: None,
            scheme: "http".to_string(),
            remote_addr: None,
            principal: None,
        }
    }

    pub fn get(path_and_query: &str) -> Self {
        Self::new(Method::GET, path_and_query)
    }

    /// Append a header value. Invalid names or values are ignored.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            if name == header::HOST {
                self.host = Some(strip_port(value.to_str().unwrap_or_default()));
            }
            self.headers.append(name, value);
        }
        self
    }

    /// Set the Host header and the matching host field.
    pub fn host(self, host: &str) -> Self {
        self.header(header::HOST.as_str(), host)
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn remote(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Convert an axum request, buffering at most `max_body_bytes` of body.
    pub async fn from_http(request: Request<Body>, max_body_bytes: usize) -> GatewayResult<Self> {
        let (parts, body) = request.into_parts();

        let remote_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let principal = parts.extensions.get::<Principal>().cloned();

        let host = parts
            .headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(strip_port)
            .or_else(|| parts.uri.host().map(str::to_string));

        let body = axum::body::to_bytes(body, max_body_bytes)
            .await
            .map_err(|_| GatewayError::PayloadTooLarge {
                limit: max_body_bytes,
            })?;

        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts.headers,
            body,
            host,
            scheme: parts.uri.scheme_str().unwrap_or("http").to_string(),
            remote_addr,
            principal,
        })
    }

    /// First value of a header as text.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// All values of a header as text, in arrival order.
    pub fn header_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .get_all(name)
            .into_iter()
            .filter_map(|v| v.to_str().ok())
    }

    /// Value of the named cookie across all `Cookie` headers.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.header_values(header::COOKIE.as_str())
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.to_string())
    }

    /// `path` plus `?query` when present.
    pub fn path_and_query(&self) -> String {
        match &self.query {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path, q),
            _ => self.path.clone(),
        }
    }
}

fn strip_port(host: &str) -> String {
    // IPv6 literals keep their brackets.
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => host[..=end].to_string(),
            None => host.to_string(),
        };
    }
    host.split(':').next().unwrap_or(host).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_and_query_split() {
        let req = InboundRequest::get("/products/1?color=red&size=m");
        assert_eq!(req.path, "/products/1");
        assert_eq!(req.query.as_deref(), Some("color=red&size=m"));
        assert_eq!(req.path_and_query(), "/products/1?color=red&size=m");
    }

    #[test]
    fn test_host_without_port() {
        let req = InboundRequest::get("/").host("api.example.com:8080");
        assert_eq!(req.host.as_deref(), Some("api.example.com"));
        assert_eq!(req.header_value("host"), Some("api.example.com:8080"));
    }

    #[test]
    fn test_cookie_lookup() {
        let req = InboundRequest::get("/")
            .header("cookie", "theme=dark; sessionid=abc123")
            .header("cookie", "other=1");

        assert_eq!(req.cookie("sessionid").as_deref(), Some("abc123"));
        assert_eq!(req.cookie("other").as_deref(), Some("1"));
        assert_eq!(req.cookie("missing"), None);
    }

    #[tokio::test]
    async fn test_from_http_enforces_body_limit() {
        let request = Request::builder()
            .uri("/upload")
            .body(Body::from(vec![0u8; 64]))
            .unwrap();

        let err = InboundRequest::from_http(request, 16).await.unwrap_err();
        assert!(matches!(err, GatewayError::PayloadTooLarge { limit: 16 }));
    }

    #[tokio::test]
    async fn test_from_http_picks_up_principal() {
        let mut request = Request::builder()
            .uri("/orders?page=2")
            .header("host", "shop.local")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(Principal::new().with_claim("sub", "alice"));

        let inbound = InboundRequest::from_http(request, 1024).await.unwrap();
        assert_eq!(inbound.host.as_deref(), Some("shop.local"));
        assert_eq!(inbound.query.as_deref(), Some("page=2"));
        assert_eq!(inbound.principal.unwrap().claim("sub"), Some("alice"));
    }
}
