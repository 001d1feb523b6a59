//! Header manipulation for forwarded traffic.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//! - Drop the inbound Host so the transport targets the downstream authority
//!
//! # Design Decisions
//! - Preserve original client IP in X-Forwarded-For, appending to any existing chain
//! - Headers named by `Connection` are treated as hop-by-hop as well

use std::net::IpAddr;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Prepare inbound headers for forwarding to a downstream service.
pub fn apply_forwarding_headers(
    headers: &mut HeaderMap,
    client_ip: Option<IpAddr>,
    inbound_scheme: &str,
    inbound_host: Option<&str>,
) {
    strip_hop_by_hop(headers);
    headers.remove(header::HOST);

    if let Some(ip) = client_ip {
        let chain = match headers.get(&X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            Some(existing) if !existing.is_empty() => format!("{}, {}", existing, ip),
            _ => ip.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(inbound_scheme) {
        headers.insert(X_FORWARDED_PROTO, value);
    }

    if let Some(host) = inbound_host {
        if let Ok(value) = HeaderValue::from_str(host) {
            headers.insert(X_FORWARDED_HOST, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_connection_listed_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-secret"));
        headers.insert("x-secret", HeaderValue::from_static("1"));
        headers.insert("x-kept", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));

        strip_hop_by_hop(&mut headers);

        assert!(headers.get("x-secret").is_none());
        assert!(headers.get(header::CONNECTION).is_none());
        assert!(headers.get(header::TRANSFER_ENCODING).is_none());
        assert!(headers.get("x-kept").is_some());
    }

    #[test]
    fn test_forwarded_for_appends() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("gateway.local"));
        headers.insert(X_FORWARDED_FOR, HeaderValue::from_static("10.0.0.1"));

        apply_forwarding_headers(
            &mut headers,
            Some("192.168.1.7".parse().unwrap()),
            "http",
            Some("gateway.local"),
        );

        assert!(headers.get(header::HOST).is_none());
        assert_eq!(headers.get(X_FORWARDED_FOR).unwrap(), "10.0.0.1, 192.168.1.7");
        assert_eq!(headers.get(X_FORWARDED_PROTO).unwrap(), "http");
        assert_eq!(headers.get(X_FORWARDED_HOST).unwrap(), "gateway.local");
    }
}
