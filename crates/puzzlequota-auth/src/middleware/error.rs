//! Error response handling for authentication middleware.
//!
//! Auth failures are answered in plain text. 401 responses carry a
//! `WWW-Authenticate: Bearer` challenge.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::error::{AuthError, UPSTREAM_FAILURE_MESSAGE};

/// Content type of every plain-text response produced by this service.
pub const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::Unauthenticated { message } => (StatusCode::UNAUTHORIZED, message),
            AuthError::UpstreamUnavailable { .. } | AuthError::UpstreamRejected { .. } => (
                StatusCode::SERVICE_UNAVAILABLE,
                UPSTREAM_FAILURE_MESSAGE.to_string(),
            ),
        };

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(TEXT_PLAIN_UTF8),
        );

        if status == StatusCode::UNAUTHORIZED {
            let www_auth = build_www_authenticate_header(&message);
            if let Ok(value) = HeaderValue::from_str(&www_auth) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }

        (status, headers, message).into_response()
    }
}

/// Builds the WWW-Authenticate header value for 401 responses.
///
/// Format: `Bearer realm="puzzlequota", error="invalid_token", error_description="..."`
fn build_www_authenticate_header(description: &str) -> String {
    let escaped_desc = description.replace('\"', "\\\"");
    format!(
        "Bearer realm=\"puzzlequota\", error=\"invalid_token\", error_description=\"{}\"",
        escaped_desc
    )
}
