//! Request-level error taxonomy.
//!
//! Every failure the pipeline can produce maps to exactly one HTTP status through
//! [`GatewayError::status`]. Errors are converted into synthesized responses at the
//! edge (`Gateway::handle`) or absorbed by the aggregator.

use std::time::Duration;

use axum::http::{header, HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::transport::{DownstreamResponse, TransportError};

/// Result alias used across the request pipeline.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Details of a rate-limit rejection, carried so the response can be rendered later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRejection {
    pub status: StatusCode,
    pub message: String,
    /// Time until the current window rolls over. `None` when headers are disabled.
    pub retry_after: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no route matches {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("no endpoint available for route '{route}': {reason}")]
    EndpointUnavailable {
        route: String,
        reason: String,
        status: StatusCode,
    },

    #[error("rate limit exceeded for client '{client}' on route '{route}'")]
    RateLimited {
        route: String,
        client: String,
        rejection: RateLimitRejection,
    },

    #[error("circuit open for route '{route}'")]
    CircuitOpen { route: String },

    #[error("downstream call for route '{route}' timed out after {timeout:?}")]
    DownstreamTimeout { route: String, timeout: Duration },

    #[error("downstream call for route '{route}' failed")]
    DownstreamTransport {
        route: String,
        #[source]
        source: TransportError,
    },

    #[error("authentication required")]
    Unauthenticated,

    #[error("forbidden: {0}")]
    Unauthorized(String),

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("invalid downstream request: {0}")]
    InvalidDownstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status this error is surfaced with.
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::EndpointUnavailable { status, .. } => *status,
            GatewayError::RateLimited { rejection, .. } => rejection.status,
            GatewayError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::DownstreamTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::DownstreamTransport { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Unauthenticated => StatusCode::UNAUTHORIZED,
            GatewayError::Unauthorized(_) => StatusCode::FORBIDDEN,
            GatewayError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::InvalidDownstream(_) | GatewayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Short machine-readable label, used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::RouteNotFound { .. } => "route_not_found",
            GatewayError::EndpointUnavailable { .. } => "endpoint_unavailable",
            GatewayError::RateLimited { .. } => "rate_limited",
            GatewayError::CircuitOpen { .. } => "circuit_open",
            GatewayError::DownstreamTimeout { .. } => "timeout",
            GatewayError::DownstreamTransport { .. } => "transport",
            GatewayError::Unauthenticated => "unauthenticated",
            GatewayError::Unauthorized(_) => "unauthorized",
            GatewayError::PayloadTooLarge { .. } => "payload_too_large",
            GatewayError::InvalidDownstream(_) => "invalid_downstream",
            GatewayError::Internal(_) => "internal",
        }
    }

    /// Render the error as a synthesized gateway response.
    pub fn to_response(&self) -> DownstreamResponse {
        match self {
            GatewayError::RateLimited { rejection, .. } => {
                let response = DownstreamResponse::new(rejection.status, rejection.message.clone());
                match rejection.retry_after {
                    Some(after) => {
                        // Whole seconds, rounded up so clients never retry early.
                        let secs = after.as_millis().div_ceil(1000).max(1);
                        response.with_header(header::RETRY_AFTER, &secs.to_string())
                    }
                    None => response,
                }
            }
            GatewayError::CircuitOpen { .. } => {
                DownstreamResponse::new(self.status(), self.to_string())
                    .with_header(HeaderName::from_static("x-gateway-circuit"), "open")
            }
            _ => DownstreamResponse::new(self.status(), self.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.to_response().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let not_found = GatewayError::RouteNotFound {
            method: "GET".into(),
            path: "/x".into(),
        };
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let timeout = GatewayError::DownstreamTimeout {
            route: "r".into(),
            timeout: Duration::from_secs(1),
        };
        assert_eq!(timeout.status(), StatusCode::SERVICE_UNAVAILABLE);

        let unavailable = GatewayError::EndpointUnavailable {
            route: "r".into(),
            reason: "empty".into(),
            status: StatusCode::NOT_FOUND,
        };
        assert_eq!(unavailable.status(), StatusCode::NOT_FOUND);

        let transport = GatewayError::DownstreamTransport {
            route: "r".into(),
            source: TransportError::Connect("refused".into()),
        };
        assert_eq!(transport.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_rate_limited_response_carries_retry_after() {
        let err = GatewayError::RateLimited {
            route: "r".into(),
            client: "c".into(),
            rejection: RateLimitRejection {
                status: StatusCode::TOO_MANY_REQUESTS,
                message: "quota".into(),
                retry_after: Some(Duration::from_millis(1200)),
            },
        };

        let response = err.to_response();
        assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.text(), "quota");
        assert_eq!(response.headers.get(header::RETRY_AFTER).unwrap(), "2");
    }

    #[test]
    fn test_rate_limited_without_headers() {
        let err = GatewayError::RateLimited {
            route: "r".into(),
            client: "c".into(),
            rejection: RateLimitRejection {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message: "slow down".into(),
                retry_after: None,
            },
        };

        let response = err.to_response();
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.headers.get(header::RETRY_AFTER).is_none());
    }
}
