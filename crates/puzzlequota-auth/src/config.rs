//! Identity provider configuration.
//!
//! All endpoints are derived from a single issuer base URL, and the
//! management client credentials are used for the durable custom-data API.
//!
//! # Example (TOML)
//!
//! ```toml
//! [identity]
//! issuer = "https://tenant.logto.app"
//! client_id = "m2m-app"
//! client_secret = "..."
//! resource = "https://default.logto.app/api"
//! principal_cache_ttl = "1h"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Errors raised while validating identity configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required value is missing.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// The issuer is not a valid absolute URL.
    #[error("Invalid issuer URL: {0}")]
    InvalidIssuer(#[from] url::ParseError),

    /// A value is out of range.
    #[error("Invalid value for {field}: {message}")]
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Why the value is rejected.
        message: String,
    },
}

/// Identity provider and management API configuration.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Base URL of the identity provider (e.g. `https://tenant.logto.app`).
    pub issuer: String,

    /// Client id of the machine-to-machine application.
    pub client_id: String,

    /// Client secret of the machine-to-machine application.
    pub client_secret: String,

    /// API resource indicator requested in the client credentials grant.
    pub resource: String,

    /// Scope requested in the client credentials grant.
    pub scope: String,

    /// Timeout applied to every outbound provider request.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Lifetime of cached principals.
    #[serde(with = "humantime_serde")]
    pub principal_cache_ttl: Duration,

    /// Whether validated principals are cached at all.
    pub principal_cache_enabled: bool,

    /// Answer provider outages on the auth path with 503 instead of 401.
    pub distinguish_upstream_errors: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            issuer: "http://localhost:3001".to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            resource: "https://default.logto.app/api".to_string(),
            scope: "all".to_string(),
            request_timeout: Duration::from_secs(10),
            principal_cache_ttl: Duration::from_secs(3600), // 1 hour
            principal_cache_enabled: true,
            distinguish_upstream_errors: false,
        }
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("resource", &self.resource)
            .field("scope", &self.scope)
            .field("request_timeout", &self.request_timeout)
            .field("principal_cache_ttl", &self.principal_cache_ttl)
            .field("principal_cache_enabled", &self.principal_cache_enabled)
            .field(
                "distinguish_upstream_errors",
                &self.distinguish_upstream_errors,
            )
            .finish()
    }
}

impl IdentityConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer is missing or unparsable, or if the
    /// management credentials are empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.issuer.trim().is_empty() {
            return Err(ConfigError::MissingField("issuer"));
        }
        self.issuer_url()?;
        if self.client_id.is_empty() {
            return Err(ConfigError::MissingField("client_id"));
        }
        if self.client_secret.is_empty() {
            return Err(ConfigError::MissingField("client_secret"));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout",
                message: "must be > 0".to_string(),
            });
        }
        Ok(())
    }

    /// Parses the issuer into a URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer is not an absolute URL.
    pub fn issuer_url(&self) -> Result<Url, url::ParseError> {
        Url::parse(&self.issuer)
    }

    /// Userinfo endpoint: `{issuer}/oidc/me`.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer is not an absolute URL.
    pub fn userinfo_endpoint(&self) -> Result<Url, url::ParseError> {
        endpoint(&self.issuer_url()?, &["oidc", "me"])
    }

    /// Token endpoint: `{issuer}/oidc/token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the issuer is not an absolute URL.
    pub fn token_endpoint(&self) -> Result<Url, url::ParseError> {
        endpoint(&self.issuer_url()?, &["oidc", "token"])
    }
}

/// Appends path segments to a base URL, tolerating a trailing slash and
/// percent-encoding each segment.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, url::ParseError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
