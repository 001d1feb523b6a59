//! Downstream endpoint.
//!
//! # Responsibilities
//! - Represent one addressable service instance (host, port, scheme, tags)
//! - Provide a stable identity for per-endpoint balancer state
//! - Deserialize from both static route config and the service registry

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single downstream service instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Endpoint {
    /// Host name or IP address.
    pub host: String,

    /// TCP port.
    pub port: u16,

    /// Overrides the route's downstream scheme when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,

    /// Free-form tags published by discovery.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            scheme: None,
            tags: Vec::new(),
        }
    }

    pub fn with_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// `host:port`, the identity used by balancer state.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_toml() {
        let endpoint: Endpoint = toml::from_str(
            r#"
            host = "10.0.0.5"
            port = 9001
            tags = ["blue"]
            "#,
        )
        .unwrap();

        assert_eq!(endpoint.authority(), "10.0.0.5:9001");
        assert_eq!(endpoint.scheme, None);
        assert_eq!(endpoint.tags, vec!["blue".to_string()]);
    }
}
