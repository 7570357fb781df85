//! Authentication and identity provider error types.
//!
//! Two layers are defined here:
//!
//! - [`ProviderError`] describes what went wrong on the wire when talking to
//!   the identity provider (network failure, non-success status, bad body).
//! - [`AuthError`] is the taxonomy callers see: the request is either
//!   unauthenticated, the upstream provider could not be used, or it
//!   refused the request outright (retrying will not help).

use reqwest::StatusCode;

/// Client-facing text for a token that could not be validated.
pub const USER_INFO_FAILURE_MESSAGE: &str = "Failed to fetch user info";

/// Client-facing text when the identity provider cannot be used.
pub const UPSTREAM_FAILURE_MESSAGE: &str = "Identity provider unavailable";

/// Errors that can occur during authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The bearer token is missing, malformed, or was rejected by the provider.
    #[error("Unauthenticated: {message}")]
    Unauthenticated {
        /// Description of why the request is unauthenticated.
        message: String,
    },

    /// The identity provider or durable backend could not be reached, answered
    /// with a non-success status on a service call, or returned an unparsable body.
    #[error("Upstream unavailable: {message}")]
    UpstreamUnavailable {
        /// Description of the upstream failure.
        message: String,
    },

    /// The provider answered a service call with a client error other than
    /// 408 or 429, e.g. 404 for a deleted user.
    #[error("Upstream rejected request ({status}): {message}")]
    UpstreamRejected {
        /// The status returned by the provider.
        status: StatusCode,
        /// Description of the rejection.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `Unauthenticated` error.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Creates a new `UpstreamUnavailable` error.
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::UpstreamUnavailable {
            message: message.into(),
        }
    }

    /// Returns `true` if this error means the caller is not authenticated.
    #[must_use]
    pub fn is_unauthenticated(&self) -> bool {
        matches!(self, Self::Unauthenticated { .. })
    }

    /// Returns `true` if this error was caused by the upstream provider.
    #[must_use]
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::UpstreamUnavailable { .. } | Self::UpstreamRejected { .. }
        )
    }

    /// Returns `true` if repeating the same call cannot succeed.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::UpstreamRejected { .. })
    }

    /// Returns the human readable message without the category prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Unauthenticated { message }
            | Self::UpstreamUnavailable { message }
            | Self::UpstreamRejected { message, .. } => message,
        }
    }
}

/// Low level failures talking to the identity provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// A network error occurred.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The provider answered with a non-success status code.
    #[error("HTTP error: status {status}")]
    Status {
        /// The status returned by the provider.
        status: StatusCode,
    },

    /// The response body could not be decoded.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Failed to build a provider URL.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Status { status }
                if status.is_client_error()
                    && status != StatusCode::REQUEST_TIMEOUT
                    && status != StatusCode::TOO_MANY_REQUESTS =>
            {
                AuthError::UpstreamRejected {
                    status,
                    message: err.to_string(),
                }
            }
            other => AuthError::upstream(other.to_string()),
        }
    }
}
