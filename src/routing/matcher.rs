//! Request constraint matching.
//!
//! # Responsibilities
//! - Match host header (exact match, case-insensitive)
//! - Match HTTP method against the route's method list
//! - Match required header values (exact)
//! - Combine conditions with AND semantics
//!
//! # Design Decisions
//! - Host matching is case-insensitive (per HTTP spec), port ignored
//! - Header values compare exactly; any one of a multi-valued header may satisfy
//! - Empty condition = always matches (wildcard)
//! - No regex to guarantee O(n) matching

use axum::http::Method;

use crate::http::request::InboundRequest;

/// Trait for matching requests against conditions.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// Returns true if the request matches this condition.
    fn matches(&self, req: &InboundRequest) -> bool;
}

/// Matches the Host header.
#[derive(Debug, Clone)]
pub struct HostMatcher {
    expected_host: String,
}

impl HostMatcher {
    /// Create a new host matcher. A port in the expected host is ignored.
    pub fn new(host: impl Into<String>) -> Self {
        let host = host.into();
        let bare = host.split(':').next().unwrap_or_default().to_string();
        Self {
            expected_host: bare,
        }
    }
}

impl Matcher for HostMatcher {
    fn matches(&self, req: &InboundRequest) -> bool {
        req.host
            .as_deref()
            .map(|h| h.eq_ignore_ascii_case(&self.expected_host))
            .unwrap_or(false)
    }
}

/// Matches the request method against an allow-list.
#[derive(Debug, Clone)]
pub struct MethodMatcher {
    methods: Vec<Method>,
}

impl MethodMatcher {
    pub fn new(methods: Vec<Method>) -> Self {
        Self { methods }
    }
}

impl Matcher for MethodMatcher {
    fn matches(&self, req: &InboundRequest) -> bool {
        self.methods.is_empty() || self.methods.contains(&req.method)
    }
}

/// Requires a header to be present with an exact value.
#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    name: String,
    value: String,
}

impl HeaderMatcher {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl Matcher for HeaderMatcher {
    fn matches(&self, req: &InboundRequest) -> bool {
        req.header_values(&self.name).any(|v| v == self.value)
    }
}

/// Combines multiple matchers with AND semantics.
#[derive(Debug, Default)]
pub struct AndMatcher {
    matchers: Vec<Box<dyn Matcher>>,
}

impl AndMatcher {
    pub fn new(matchers: Vec<Box<dyn Matcher>>) -> Self {
        Self { matchers }
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

impl Matcher for AndMatcher {
    fn matches(&self, req: &InboundRequest) -> bool {
        // All matchers must pass (AND)
        self.matchers.iter().all(|m| m.matches(req))
    }
}
