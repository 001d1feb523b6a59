//! Downstream path templates and URL construction.
//!
//! # Responsibilities
//! - Substitute captured placeholders into the downstream path and query
//! - Merge the inbound query string with the template's (`inbound&template`)
//! - Produce the final `Url` for a leased endpoint

use url::Url;

use crate::error::{GatewayError, GatewayResult};
use crate::load_balancer::Endpoint;
use crate::routing::template::{Placeholders, TemplateError};

/// A downstream path template such as `/api/products/{id}?source=gw`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamTemplate {
    path: String,
    query: Option<String>,
}

impl DownstreamTemplate {
    pub fn parse(raw: &str) -> Result<Self, TemplateError> {
        if !raw.starts_with('/') {
            return Err(TemplateError::MissingLeadingSlash(raw.to_string()));
        }
        let (path, query) = match raw.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (raw.to_string(), None),
        };
        Ok(Self { path, query })
    }

    /// Placeholder names referenced by the template.
    pub fn placeholder_names(&self) -> Vec<&str> {
        let mut names = placeholder_tokens(&self.path);
        if let Some(query) = &self.query {
            names.extend(placeholder_tokens(query));
        }
        names
    }

    pub fn render_path(&self, placeholders: &Placeholders) -> String {
        substitute(&self.path, placeholders)
    }

    /// Inbound query first, then the template's rendered query.
    pub fn render_query(&self, inbound: Option<&str>, placeholders: &Placeholders) -> Option<String> {
        let template = self
            .query
            .as_deref()
            .map(|q| substitute(q, placeholders))
            .filter(|q| !q.is_empty());
        let inbound = inbound.filter(|q| !q.is_empty());

        match (inbound, template) {
            (Some(i), Some(t)) => Some(format!("{}&{}", i, t)),
            (Some(i), None) => Some(i.to_string()),
            (None, t) => t,
        }
    }
}

/// Build the downstream URL for one endpoint.
pub fn build_url(
    scheme: &str,
    endpoint: &Endpoint,
    path: &str,
    query: Option<&str>,
    extra_query: &[(String, String)],
) -> GatewayResult<Url> {
    let scheme = endpoint.scheme.as_deref().unwrap_or(scheme);
    let mut url = Url::parse(&format!("{}://{}:{}{}", scheme, endpoint.host, endpoint.port, path))
        .map_err(|e| GatewayError::InvalidDownstream(format!("{} ({})", e, endpoint)))?;

    url.set_query(query);
    if !extra_query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in extra_query {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}

/// `scheme://host:port` of an endpoint, as exposed to header transforms.
pub fn base_url(scheme: &str, endpoint: &Endpoint) -> String {
    format!(
        "{}://{}:{}",
        endpoint.scheme.as_deref().unwrap_or(scheme),
        endpoint.host,
        endpoint.port
    )
}

/// Left-to-right; substituted values are never rescanned.
fn substitute(template: &str, placeholders: &Placeholders) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let token = &rest[start..=start + len];
        match placeholders.get(&token[1..token.len() - 1]) {
            Some(value) => out.push_str(value),
            None => out.push_str(token),
        }
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    out
}

fn placeholder_tokens(text: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find('{') {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        names.push(&rest[start + 1..start + len]);
        rest = &rest[start + len + 1..];
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn captured(pairs: &[(&str, &str)]) -> Placeholders {
        let mut placeholders = Placeholders::new();
        for (name, value) in pairs {
            placeholders.insert(*name, *value);
        }
        placeholders
    }

    #[test]
    fn test_render_path() {
        let template = DownstreamTemplate::parse("/api/products/{id}/reviews").unwrap();
        assert_eq!(
            template.render_path(&captured(&[("id", "42")])),
            "/api/products/42/reviews"
        );
        assert_eq!(template.placeholder_names(), vec!["id"]);
    }

    #[test]
    fn test_captured_braces_are_not_rescanned() {
        let template = DownstreamTemplate::parse("/{first}/{second}").unwrap();
        let placeholders = captured(&[("first", "{second}"), ("second", "{first}")]);
        assert_eq!(template.render_path(&placeholders), "/{second}/{first}");

        assert_eq!(substitute("/{unknown}/{first", &placeholders), "/{unknown}/{first");
    }

    #[test]
    fn test_query_merge_order() {
        let template = DownstreamTemplate::parse("/search?tenant={tenant}").unwrap();
        let placeholders = captured(&[("tenant", "acme")]);

        assert_eq!(
            template.render_query(Some("q=shoes"), &placeholders).as_deref(),
            Some("q=shoes&tenant=acme")
        );
        assert_eq!(
            template.render_query(None, &placeholders).as_deref(),
            Some("tenant=acme")
        );
    }

    #[test]
    fn test_build_url_with_endpoint_scheme_and_extra_query() {
        let endpoint = Endpoint::new("10.0.0.2", 8443).with_scheme("https");
        let url = build_url(
            "http",
            &endpoint,
            "/orders/7",
            Some("page=1"),
            &[("customer".to_string(), "alice".to_string())],
        )
        .unwrap();

        assert_eq!(url.as_str(), "https://10.0.0.2:8443/orders/7?page=1&customer=alice");
    }

    #[test]
    fn test_base_url() {
        assert_eq!(base_url("http", &Endpoint::new("svc", 80)), "http://svc:80");
    }
}
