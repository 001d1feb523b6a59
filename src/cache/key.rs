//! Cache key derivation.

use std::fmt;

use sha2::{Digest, Sha256};

use crate::config::CacheOptions;
use crate::http::request::InboundRequest;

/// Stable fingerprint of a request for one route's cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_request(request: &InboundRequest, options: &CacheOptions) -> Self {
        let mut key = String::with_capacity(128);
        key.push_str(request.method.as_str());
        key.push('|');
        key.push_str(&request.host.as_deref().unwrap_or_default().to_ascii_lowercase());
        key.push('|');
        let path = request.path.trim_end_matches('/');
        key.push_str(if path.is_empty() { "/" } else { path });

        if let Some(query) = request.query.as_deref().filter(|q| !q.is_empty()) {
            let mut pairs: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
            pairs.sort_unstable();
            key.push('?');
            key.push_str(&pairs.join("&"));
        }

        for name in &options.vary_headers {
            let values: Vec<&str> = request.header_values(name).collect();
            key.push('|');
            key.push_str(&name.to_ascii_lowercase());
            key.push('=');
            key.push_str(&values.join(","));
        }

        if options.enable_content_hashing && !request.body.is_empty() {
            let digest = Sha256::digest(&request.body);
            key.push_str("|body=");
            key.push_str(&format!("{:x}", digest));
        }

        Self(key)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
