//! Response handling.
//!
//! # Responsibilities
//! - Convert buffered downstream responses into axum responses
//! - Strip hop-by-hop headers on the way back to the client
//!
//! # Design Decisions
//! - The pipeline works on buffered `DownstreamResponse`s; conversion to a
//!   streaming axum body only happens here at the edge

use axum::body::Body;
use axum::response::{IntoResponse, Response};

use crate::security::headers::strip_hop_by_hop;
use crate::transport::DownstreamResponse;

impl IntoResponse for DownstreamResponse {
    fn into_response(self) -> Response {
        let DownstreamResponse {
            status,
            mut headers,
            body,
        } = self;
        strip_hop_by_hop(&mut headers);
        // hyper derives the length from the buffered body.
        headers.remove(axum::http::header::CONTENT_LENGTH);

        let mut response = Response::new(Body::from(body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue, StatusCode};

    #[test]
    fn test_hop_by_hop_removed() {
        let mut downstream = DownstreamResponse::new(StatusCode::OK, "hi");
        downstream
            .headers
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
        downstream
            .headers
            .insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let response = downstream.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONNECTION).is_none());
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "text/plain");
    }
}
