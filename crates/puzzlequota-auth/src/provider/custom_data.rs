//! Per-user custom data on the provider's management API.
//!
//! Contract:
//!
//! - `GET {issuer}/api/users/{subject}/custom-data` returns the custom data
//!   object (`{}` when the user has none).
//! - `PATCH {issuer}/api/users/{subject}/custom-data` with body
//!   `{"customData": {...}}` merges the given fields into the record.
//!
//! Both calls present a freshly acquired management credential.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use url::Url;

use crate::config::{IdentityConfig, endpoint};
use crate::error::{AuthError, ProviderError};
use crate::provider::management::ManagementTokenProvider;

/// Client for the durable custom-data record of each user.
#[derive(Clone)]
pub struct CustomDataClient {
    http_client: reqwest::Client,
    issuer: Url,
    tokens: Arc<dyn ManagementTokenProvider>,
}

impl CustomDataClient {
    /// Creates a new client.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        issuer: Url,
        tokens: Arc<dyn ManagementTokenProvider>,
    ) -> Self {
        Self {
            http_client,
            issuer,
            tokens,
        }
    }

    /// Creates a client from identity configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer URL is invalid.
    pub fn from_config(
        http_client: reqwest::Client,
        config: &IdentityConfig,
        tokens: Arc<dyn ManagementTokenProvider>,
    ) -> Result<Self, url::ParseError> {
        Ok(Self::new(http_client, config.issuer_url()?, tokens))
    }

    fn url_for(&self, subject_id: &str) -> Result<Url, ProviderError> {
        Ok(endpoint(
            &self.issuer,
            &["api", "users", subject_id, "custom-data"],
        )?)
    }

    /// Reads the user's custom data.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamUnavailable` if a credential cannot be acquired, the
    /// request fails, or the body is not a JSON object. A client error status
    /// such as 404 yields `UpstreamRejected`.
    pub async fn fetch(&self, subject_id: &str) -> Result<Map<String, Value>, AuthError> {
        let credential = self.tokens.acquire().await?;
        let url = self.url_for(subject_id)?;

        let response = self
            .http_client
            .get(url)
            .bearer_auth(&credential.access_token)
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(subject = %subject_id, status = %status, "Custom data read failed");
            return Err(ProviderError::Status { status }.into());
        }

        let body = response.bytes().await.map_err(ProviderError::from)?;
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(Value::Null) => Ok(Map::new()),
            Ok(other) => Err(ProviderError::InvalidResponse(format!(
                "expected custom data object, got {other}"
            ))
            .into()),
            Err(e) => Err(ProviderError::InvalidResponse(e.to_string()).into()),
        }
    }

    /// Merges `fields` into the user's custom data.
    ///
    /// # Errors
    ///
    /// Returns `UpstreamUnavailable` if a credential cannot be acquired or
    /// the request fails, and `UpstreamRejected` on a client error status.
    pub async fn patch(
        &self,
        subject_id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), AuthError> {
        let credential = self.tokens.acquire().await?;
        let url = self.url_for(subject_id)?;

        let response = self
            .http_client
            .patch(url)
            .bearer_auth(&credential.access_token)
            .json(&json!({ "customData": fields }))
            .send()
            .await
            .map_err(ProviderError::from)?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(subject = %subject_id, status = %status, "Custom data patch failed");
            return Err(ProviderError::Status { status }.into());
        }

        Ok(())
    }
}
