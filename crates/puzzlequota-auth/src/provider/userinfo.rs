//! Bearer token validation against the provider's userinfo endpoint.
//!
//! Contract: `GET {issuer}/oidc/me` with `Authorization: Bearer <token>`.
//! A 2xx body is the caller's claims as a JSON object; any other status
//! means the token was rejected.

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::config::IdentityConfig;
use crate::error::{AuthError, ProviderError, USER_INFO_FAILURE_MESSAGE};
use crate::principal::Principal;

/// Validates bearer tokens and resolves them to principals.
///
/// Implementations perform no retries; retry policy belongs to the caller.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Validates a bearer token.
    ///
    /// # Errors
    ///
    /// - `Unauthenticated` if the token is empty or rejected by the provider
    /// - `UpstreamUnavailable` if the provider cannot be reached or its
    ///   response body cannot be parsed into a principal
    async fn validate(&self, bearer_token: &str) -> Result<Principal, AuthError>;
}

/// Identity resolver backed by the provider's userinfo endpoint.
pub struct HttpIdentityResolver {
    http_client: reqwest::Client,
    userinfo_endpoint: Url,
}

impl HttpIdentityResolver {
    /// Creates a resolver for the given userinfo endpoint.
    #[must_use]
    pub fn new(http_client: reqwest::Client, userinfo_endpoint: Url) -> Self {
        Self {
            http_client,
            userinfo_endpoint,
        }
    }

    /// Creates a resolver from identity configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer URL is invalid.
    pub fn from_config(
        http_client: reqwest::Client,
        config: &IdentityConfig,
    ) -> Result<Self, url::ParseError> {
        Ok(Self::new(http_client, config.userinfo_endpoint()?))
    }

    async fn fetch_claims(&self, bearer_token: &str) -> Result<Value, ProviderError> {
        let response = self
            .http_client
            .get(self.userinfo_endpoint.clone())
            .bearer_auth(bearer_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::Status { status });
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl IdentityResolver for HttpIdentityResolver {
    async fn validate(&self, bearer_token: &str) -> Result<Principal, AuthError> {
        if bearer_token.is_empty() {
            return Err(AuthError::unauthenticated("Empty Bearer token"));
        }

        let claims = match self.fetch_claims(bearer_token).await {
            Ok(claims) => claims,
            Err(ProviderError::Status { status }) => {
                tracing::debug!(status = %status, "Userinfo request rejected");
                return Err(AuthError::unauthenticated(USER_INFO_FAILURE_MESSAGE));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Userinfo request failed");
                return Err(e.into());
            }
        };

        let principal = Principal::from_claims(claims).ok_or_else(|| {
            tracing::warn!("Userinfo response has no subject claim");
            AuthError::upstream("Userinfo response is missing the subject claim")
        })?;

        tracing::debug!(subject = %principal.subject_id(), "Token validated");
        Ok(principal)
    }
}
