//! Header and claim transforms.
//!
//! # Rules
//! ```text
//! header transform   "find, replace"   rewrite an existing header value
//!                    "value"           set the header
//! claim selector     Claims[sub] > value
//!                    Claims[roles] > value[1] > ,
//! ```
//! Transform text may reference `{RemoteIpAddress}`, `{BaseUrl}`,
//! `{DownstreamBaseUrl}` and `{UpstreamHost}`.

use std::collections::BTreeMap;

use axum::http::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;

use crate::config::RouteConfig;
use crate::http::request::Principal;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("invalid header name '{0}'")]
    InvalidHeaderName(String),

    #[error("invalid claim selector '{0}'")]
    InvalidSelector(String),

    #[error("claim '{0}' not present")]
    MissingClaim(String),

    #[error("claim '{claim}' has no part {index}")]
    ClaimIndexOutOfRange { claim: String, index: usize },
}

/// Values available to transform text.
#[derive(Debug, Default, Clone)]
pub struct TransformVars {
    pub remote_ip: Option<String>,
    pub base_url: Option<String>,
    pub downstream_base_url: Option<String>,
    pub upstream_host: Option<String>,
}

impl TransformVars {
    fn expand(&self, text: &str) -> String {
        if !text.contains('{') {
            return text.to_string();
        }
        text.replace("{RemoteIpAddress}", self.remote_ip.as_deref().unwrap_or_default())
            .replace("{BaseUrl}", self.base_url.as_deref().unwrap_or_default())
            .replace(
                "{DownstreamBaseUrl}",
                self.downstream_base_url.as_deref().unwrap_or_default(),
            )
            .replace("{UpstreamHost}", self.upstream_host.as_deref().unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Rewrite {
    Replace { find: String, replace: String },
    Set(String),
}

/// One header rule.
#[derive(Debug, Clone)]
pub struct HeaderTransform {
    name: HeaderName,
    rewrite: Rewrite,
}

impl HeaderTransform {
    pub fn parse(name: &str, spec: &str) -> Result<Self, TransformError> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| TransformError::InvalidHeaderName(name.to_string()))?;
        let rewrite = match spec.split_once(',') {
            Some((find, replace)) => Rewrite::Replace {
                find: find.trim().to_string(),
                replace: replace.trim().to_string(),
            },
            None => Rewrite::Set(spec.trim().to_string()),
        };
        Ok(Self { name, rewrite })
    }

    pub fn apply(&self, headers: &mut HeaderMap, vars: &TransformVars) {
        match &self.rewrite {
            Rewrite::Set(value) => {
                if let Ok(value) = HeaderValue::from_str(&vars.expand(value)) {
                    headers.insert(self.name.clone(), value);
                }
            }
            Rewrite::Replace { find, replace } => {
                let find = vars.expand(find);
                if find.is_empty() {
                    return;
                }
                let replace = vars.expand(replace);
                let rewritten: Vec<HeaderValue> = headers
                    .get_all(&self.name)
                    .iter()
                    .filter_map(|v| v.to_str().ok())
                    .filter_map(|v| HeaderValue::from_str(&v.replace(&find, &replace)).ok())
                    .collect();
                if rewritten.is_empty() {
                    return;
                }
                headers.remove(&self.name);
                for value in rewritten {
                    headers.append(self.name.clone(), value);
                }
            }
        }
    }
}

/// Picks a value out of the principal's claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimSelector {
    claim: String,
    index: Option<usize>,
    delimiter: Option<String>,
}

impl ClaimSelector {
    pub fn parse(raw: &str) -> Result<Self, TransformError> {
        let invalid = || TransformError::InvalidSelector(raw.to_string());
        let parts: Vec<&str> = raw.split('>').map(str::trim).collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(invalid());
        }

        let claim = parts[0]
            .strip_prefix("Claims[")
            .and_then(|p| p.strip_suffix(']'))
            .filter(|c| !c.is_empty())
            .ok_or_else(invalid)?;

        let index = match parts[1] {
            "value" => None,
            other => {
                let index = other
                    .strip_prefix("value[")
                    .and_then(|p| p.strip_suffix(']'))
                    .and_then(|i| i.parse::<usize>().ok())
                    .ok_or_else(invalid)?;
                Some(index)
            }
        };

        let delimiter = match parts.get(2) {
            Some(d) if !d.is_empty() => Some(d.to_string()),
            Some(_) => return Err(invalid()),
            None => None,
        };
        if index.is_some() && delimiter.is_none() {
            return Err(invalid());
        }

        Ok(Self {
            claim: claim.to_string(),
            index,
            delimiter,
        })
    }

    pub fn select(&self, principal: &Principal) -> Result<String, TransformError> {
        let value = principal
            .claim(&self.claim)
            .ok_or_else(|| TransformError::MissingClaim(self.claim.clone()))?;

        match (self.index, &self.delimiter) {
            (Some(index), Some(delimiter)) => value
                .split(delimiter.as_str())
                .nth(index)
                .map(|v| v.trim().to_string())
                .ok_or_else(|| TransformError::ClaimIndexOutOfRange {
                    claim: self.claim.clone(),
                    index,
                }),
            _ => Ok(value.to_string()),
        }
    }
}

/// All transforms compiled for one route.
#[derive(Debug, Clone, Default)]
pub struct TransformRules {
    pub upstream_headers: Vec<HeaderTransform>,
    pub downstream_headers: Vec<HeaderTransform>,
    pub claims_to_headers: Vec<(HeaderName, ClaimSelector)>,
    pub claims_to_queries: Vec<(String, ClaimSelector)>,
}

impl TransformRules {
    pub fn compile(config: &RouteConfig) -> Result<Self, TransformError> {
        Ok(Self {
            upstream_headers: header_rules(&config.upstream_header_transform)?,
            downstream_headers: header_rules(&config.downstream_header_transform)?,
            claims_to_headers: config
                .add_headers_to_request
                .iter()
                .map(|(name, selector)| {
                    let name = HeaderName::from_bytes(name.as_bytes())
                        .map_err(|_| TransformError::InvalidHeaderName(name.clone()))?;
                    Ok((name, ClaimSelector::parse(selector)?))
                })
                .collect::<Result<_, TransformError>>()?,
            claims_to_queries: config
                .add_queries_to_request
                .iter()
                .map(|(name, selector)| Ok((name.clone(), ClaimSelector::parse(selector)?)))
                .collect::<Result<_, TransformError>>()?,
        })
    }

    pub fn needs_principal(&self) -> bool {
        !self.claims_to_headers.is_empty() || !self.claims_to_queries.is_empty()
    }

    /// Headers derived from claims.
    pub fn claim_headers(
        &self,
        principal: Option<&Principal>,
    ) -> Result<Vec<(HeaderName, HeaderValue)>, TransformError> {
        let mut out = Vec::with_capacity(self.claims_to_headers.len());
        for (name, selector) in &self.claims_to_headers {
            let principal = principal.ok_or_else(|| TransformError::MissingClaim(selector.claim.clone()))?;
            let value = selector.select(principal)?;
            if let Ok(value) = HeaderValue::from_str(&value) {
                out.push((name.clone(), value));
            }
        }
        Ok(out)
    }

    /// Query parameters derived from claims.
    pub fn claim_queries(&self, principal: Option<&Principal>) -> Result<Vec<(String, String)>, TransformError> {
        self.claims_to_queries
            .iter()
            .map(|(name, selector)| {
                let principal =
                    principal.ok_or_else(|| TransformError::MissingClaim(selector.claim.clone()))?;
                Ok((name.clone(), selector.select(principal)?))
            })
            .collect()
    }
}

fn header_rules(rules: &BTreeMap<String, String>) -> Result<Vec<HeaderTransform>, TransformError> {
    rules
        .iter()
        .map(|(name, spec)| HeaderTransform::parse(name, spec))
        .collect()
}
