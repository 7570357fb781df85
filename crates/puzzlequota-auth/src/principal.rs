//! Authenticated principal and token fingerprint types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// The authenticated caller, resolved from a bearer token.
///
/// A principal is immutable once constructed; a new validation produces a
/// new instance. Two principals are the same caller when their subject ids
/// are equal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    /// Stable, provider-issued subject identifier (`sub` claim).
    subject_id: String,

    /// Every claim returned by the userinfo endpoint.
    raw_claims: Map<String, Value>,

    /// Provider-managed free-form user attributes (`custom_data` claim).
    custom_data: Map<String, Value>,
}

impl Principal {
    /// Builds a principal from a userinfo response body.
    ///
    /// Returns `None` if the body is not a JSON object or has no non-empty
    /// string `sub` claim. A missing or non-object `custom_data` claim yields
    /// empty custom data.
    #[must_use]
    pub fn from_claims(claims: Value) -> Option<Self> {
        let Value::Object(raw_claims) = claims else {
            return None;
        };

        let subject_id = raw_claims
            .get("sub")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())?
            .to_string();

        let custom_data = match raw_claims.get("custom_data") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        };

        Some(Self {
            subject_id,
            raw_claims,
            custom_data,
        })
    }

    /// Returns the subject identifier.
    #[must_use]
    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Returns all claims as received from the provider.
    #[must_use]
    pub fn raw_claims(&self) -> &Map<String, Value> {
        &self.raw_claims
    }

    /// Returns the provider-managed custom data.
    #[must_use]
    pub fn custom_data(&self) -> &Map<String, Value> {
        &self.custom_data
    }

    /// Gets a single claim by name.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.raw_claims.get(name)
    }
}

impl PartialEq for Principal {
    fn eq(&self, other: &Self) -> bool {
        self.subject_id == other.subject_id
    }
}

impl Eq for Principal {}

/// Cache key derived from a raw bearer token.
///
/// The fingerprint is the lowercase hex SHA-256 digest of the token, so raw
/// tokens are never stored at rest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TokenFingerprint(String);

impl TokenFingerprint {
    /// Derives the fingerprint of a bearer token.
    #[must_use]
    pub fn of(token: &str) -> Self {
        let digest = Sha256::digest(token.as_bytes());
        Self(hex::encode(digest))
    }

    /// Returns the fingerprint as a hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TokenFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
