//! Management credentials via the OAuth 2.0 client credentials grant.
//!
//! Contract: `POST {issuer}/oidc/token` with
//! `Authorization: Basic base64(client_id:client_secret)` and the form body
//! `grant_type=client_credentials&resource=<resource>&scope=<scope>`.
//!
//! Credentials are never cached here: every caller fetches its own.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::config::IdentityConfig;
use crate::error::{AuthError, ProviderError};

/// Service-level access token for the management API.
#[derive(Clone)]
pub struct ManagementCredential {
    /// The bearer token to present to the management API.
    pub access_token: String,

    /// Lifetime in seconds as reported by the provider, if any.
    pub expires_in: Option<u64>,
}

impl std::fmt::Debug for ManagementCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagementCredential")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Source of management credentials.
#[async_trait]
pub trait ManagementTokenProvider: Send + Sync {
    /// Acquires a fresh management credential.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamUnavailable` on any network failure, non-success
    /// response, or unparsable token response.
    async fn acquire(&self) -> Result<ManagementCredential, AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Client credentials grant against the provider's token endpoint.
pub struct ClientCredentialsProvider {
    http_client: reqwest::Client,
    token_endpoint: Url,
    client_id: String,
    client_secret: String,
    resource: String,
    scope: String,
}

impl ClientCredentialsProvider {
    /// Creates a provider from identity configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer URL is invalid.
    pub fn from_config(
        http_client: reqwest::Client,
        config: &IdentityConfig,
    ) -> Result<Self, url::ParseError> {
        Ok(Self {
            http_client,
            token_endpoint: config.token_endpoint()?,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            resource: config.resource.clone(),
            scope: config.scope.clone(),
        })
    }

    async fn request_token(&self) -> Result<TokenResponse, ProviderError> {
        let response = self
            .http_client
            .post(self.token_endpoint.clone())
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[
                ("grant_type", "client_credentials"),
                ("resource", self.resource.as_str()),
                ("scope", self.scope.as_str()),
            ])
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
impl ManagementTokenProvider for ClientCredentialsProvider {
    async fn acquire(&self) -> Result<ManagementCredential, AuthError> {
        let token = self.request_token().await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to acquire management token");
            AuthError::upstream(format!("Failed to acquire management token: {e}"))
        })?;

        Ok(ManagementCredential {
            access_token: token.access_token,
            expires_in: token.expires_in,
        })
    }
}
