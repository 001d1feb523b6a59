//! Upstream path templates.
//!
//! # Syntax
//! ```text
//! /products/{id}             placeholder: one non-empty segment
//! /files/{*path}             catch-all: the remaining segments, slashes included
//! /{everything}              a trailing `{everything}` is a catch-all as well
//! /                          root matches only `/`
//! ```
//!
//! # Design Decisions
//! - Matching is segment-wise; no regex, O(segments)
//! - Trailing slashes are ignored on both sides
//! - Placeholders must span a whole segment (`/v{version}` is rejected)
//! - A catch-all also matches zero remaining segments

use std::fmt;

use thiserror::Error;

const EVERYTHING: &str = "everything";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template '{0}' must start with '/'")]
    MissingLeadingSlash(String),

    #[error("template '{0}' must not contain a query string")]
    QueryNotSupported(String),

    #[error("template '{0}' contains an empty segment")]
    EmptySegment(String),

    #[error("template '{template}' has a malformed placeholder in segment '{segment}'")]
    MalformedPlaceholder { template: String, segment: String },

    #[error("template '{template}' declares placeholder '{name}' twice")]
    DuplicatePlaceholder { template: String, name: String },

    #[error("template '{0}' has a catch-all before its last segment")]
    CatchAllNotLast(String),
}

/// One compiled template segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Placeholder(String),
    CatchAll(String),
}

/// Values captured while matching, in template order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Placeholders(Vec<(String, String)>);

impl Placeholders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A compiled upstream path template.
#[derive(Debug, Clone)]
pub struct UpstreamTemplate {
    raw: String,
    segments: Vec<Segment>,
    case_sensitive: bool,
}

impl UpstreamTemplate {
    pub fn parse(raw: &str, case_sensitive: bool) -> Result<Self, TemplateError> {
        if !raw.starts_with('/') {
            return Err(TemplateError::MissingLeadingSlash(raw.to_string()));
        }
        if raw.contains('?') {
            return Err(TemplateError::QueryNotSupported(raw.to_string()));
        }

        let trimmed = raw.trim_end_matches('/');
        let mut segments = Vec::new();
        if !trimmed.is_empty() {
            let parts: Vec<&str> = trimmed[1..].split('/').collect();
            let last = parts.len() - 1;
            for (i, part) in parts.into_iter().enumerate() {
                segments.push(parse_segment(raw, part, i == last)?);
            }
        }

        let mut seen: Vec<&str> = Vec::new();
        for segment in &segments {
            if let Segment::Placeholder(name) | Segment::CatchAll(name) = segment {
                if seen.contains(&name.as_str()) {
                    return Err(TemplateError::DuplicatePlaceholder {
                        template: raw.to_string(),
                        name: name.clone(),
                    });
                }
                seen.push(name);
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
            case_sensitive,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Number of placeholder and catch-all segments.
    pub fn wildcard_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| !matches!(s, Segment::Literal(_)))
            .count()
    }

    /// True for templates like `/{everything}` that match any path.
    pub fn is_catch_all_only(&self) -> bool {
        matches!(self.segments.as_slice(), [Segment::CatchAll(_)])
    }

    /// Names of every placeholder, catch-all included.
    pub fn placeholder_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) | Segment::CatchAll(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match a request path, capturing placeholder values.
    pub fn matches(&self, path: &str) -> Option<Placeholders> {
        let trimmed = path.trim_end_matches('/');
        let parts: Vec<&str> = if trimmed.is_empty() {
            Vec::new()
        } else {
            trimmed.strip_prefix('/').unwrap_or(trimmed).split('/').collect()
        };

        let mut captured = Placeholders::new();
        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::CatchAll(name) => {
                    let rest = parts.get(i..).map(|r| r.join("/")).unwrap_or_default();
                    captured.insert(name.clone(), rest);
                    return Some(captured);
                }
                Segment::Placeholder(name) => {
                    let part = parts.get(i)?;
                    if part.is_empty() {
                        return None;
                    }
                    captured.insert(name.clone(), *part);
                }
                Segment::Literal(literal) => {
                    let part = parts.get(i)?;
                    let equal = if self.case_sensitive {
                        part == literal
                    } else {
                        part.eq_ignore_ascii_case(literal)
                    };
                    if !equal {
                        return None;
                    }
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(captured)
    }
}

impl fmt::Display for UpstreamTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn parse_segment(template: &str, part: &str, is_last: bool) -> Result<Segment, TemplateError> {
    if part.is_empty() {
        return Err(TemplateError::EmptySegment(template.to_string()));
    }

    let has_braces = part.contains('{') || part.contains('}');
    if !has_braces {
        return Ok(Segment::Literal(part.to_string()));
    }

    let malformed = || TemplateError::MalformedPlaceholder {
        template: template.to_string(),
        segment: part.to_string(),
    };

    let inner = part
        .strip_prefix('{')
        .and_then(|p| p.strip_suffix('}'))
        .ok_or_else(malformed)?;
    if inner.contains('{') || inner.contains('}') {
        return Err(malformed());
    }

    if let Some(name) = inner.strip_prefix('*') {
        if name.is_empty() {
            return Err(malformed());
        }
        if !is_last {
            return Err(TemplateError::CatchAllNotLast(template.to_string()));
        }
        return Ok(Segment::CatchAll(name.to_string()));
    }

    if inner.is_empty() {
        return Err(malformed());
    }
    if inner == EVERYTHING && is_last {
        return Ok(Segment::CatchAll(inner.to_string()));
    }
    Ok(Segment::Placeholder(inner.to_string()))
}
