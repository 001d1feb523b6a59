//! Response aggregation for aggregate routes.
//!
//! # Output
//! ```text
//! route_keys = ["Laura", "Tom"]
//!     Laura → 200 {Hello from Laura}
//!     Tom   → 200 {Hello from Tom}
//!     => {"Laura":{Hello from Laura},"Tom":{Hello from Tom}}
//!
//!     Laura → 404
//!     => {"Laura":,"Tom":{Hello from Tom}}
//! ```
//! Bodies are spliced in verbatim. A key shared by several routes becomes a
//! JSON array of the non-empty bodies.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::http::{header, StatusCode};

use crate::error::GatewayResult;
use crate::transport::DownstreamResponse;

/// Outcome of one sub-route invocation.
#[derive(Debug)]
pub struct AggregatePart {
    pub key: String,
    pub outcome: GatewayResult<DownstreamResponse>,
}

impl AggregatePart {
    /// Body of a successful downstream response, else `None`.
    pub fn success_body(&self) -> Option<&[u8]> {
        match &self.outcome {
            Ok(response) if response.is_success() => Some(&response.body),
            _ => None,
        }
    }
}

/// Merges sub-route outcomes into the aggregate response.
pub trait ResponseAggregator: Send + Sync + fmt::Debug {
    fn aggregate(&self, parts: &[AggregatePart]) -> DownstreamResponse;
}

/// Default aggregator: one JSON member per key, in declared order.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleJsonAggregator;

impl ResponseAggregator for SimpleJsonAggregator {
    fn aggregate(&self, parts: &[AggregatePart]) -> DownstreamResponse {
        let mut order: Vec<&str> = Vec::new();
        let mut grouped: HashMap<&str, Vec<&AggregatePart>> = HashMap::new();
        for part in parts {
            let entry = grouped.entry(part.key.as_str()).or_default();
            if entry.is_empty() {
                order.push(part.key.as_str());
            }
            entry.push(part);
        }

        let mut body: Vec<u8> = Vec::with_capacity(256);
        body.push(b'{');
        for (i, key) in order.iter().enumerate() {
            if i > 0 {
                body.push(b',');
            }
            let quoted = serde_json::to_string(key).unwrap_or_else(|_| format!("\"{}\"", key));
            body.extend_from_slice(quoted.as_bytes());
            body.push(b':');

            let members = &grouped[key];
            if members.len() == 1 {
                if let Some(value) = members[0].success_body() {
                    body.extend_from_slice(value);
                }
            } else {
                body.push(b'[');
                let values = members
                    .iter()
                    .filter_map(|p| p.success_body())
                    .filter(|b| !b.is_empty());
                for (j, value) in values.enumerate() {
                    if j > 0 {
                        body.push(b',');
                    }
                    body.extend_from_slice(value);
                }
                body.push(b']');
            }
        }
        body.push(b'}');

        DownstreamResponse::new(StatusCode::OK, body)
            .with_header(header::CONTENT_TYPE, "application/json; charset=utf-8")
    }
}

/// Named aggregators plus the default.
#[derive(Debug, Clone)]
pub struct AggregatorRegistry {
    named: HashMap<String, Arc<dyn ResponseAggregator>>,
    default: Arc<dyn ResponseAggregator>,
}

impl Default for AggregatorRegistry {
    fn default() -> Self {
        Self {
            named: HashMap::new(),
            default: Arc::new(SimpleJsonAggregator),
        }
    }
}

impl AggregatorRegistry {
    pub fn register(&mut self, name: impl Into<String>, aggregator: Arc<dyn ResponseAggregator>) {
        self.named.insert(name.into(), aggregator);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    /// The named aggregator, or the default when `name` is `None` or unknown.
    pub fn get(&self, name: Option<&str>) -> Arc<dyn ResponseAggregator> {
        name.and_then(|n| self.named.get(n))
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}
