//! Quota operation errors and their HTTP mapping.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use puzzlequota_auth::AuthError;
use puzzlequota_auth::middleware::TEXT_PLAIN_UTF8;

use crate::cache::CacheError;

/// Message returned when a decrement finds no remaining balance.
pub const EXHAUSTED_MESSAGE: &str = "Insufficient puzzle count, cannot use";

#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// Decrement attempted with a balance of zero.
    #[error("{}", EXHAUSTED_MESSAGE)]
    Exhausted,

    /// The durable record could not be read or written on a synchronous path.
    #[error("durable backend unavailable: {0}")]
    Upstream(#[from] AuthError),

    /// The fast cache rejected a write.
    #[error("cache write failed: {0}")]
    Cache(#[from] CacheError),
}

impl QuotaError {
    pub fn status(&self) -> StatusCode {
        match self {
            QuotaError::Exhausted => StatusCode::BAD_REQUEST,
            QuotaError::Upstream(_) | QuotaError::Cache(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for QuotaError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            QuotaError::Exhausted => EXHAUSTED_MESSAGE.to_string(),
            other => {
                tracing::error!(error = %other, "Quota operation failed");
                "Internal Server Error".to_string()
            }
        };

        (status, [(header::CONTENT_TYPE, TEXT_PLAIN_UTF8)], body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn test_exhausted_is_bad_request() {
        let response = QuotaError::Exhausted.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            TEXT_PLAIN_UTF8
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], EXHAUSTED_MESSAGE.as_bytes());
    }

    #[tokio::test]
    async fn test_upstream_is_internal_error_without_details() {
        let error = QuotaError::from(AuthError::upstream("token endpoint returned 500"));
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Internal Server Error");
    }
}
