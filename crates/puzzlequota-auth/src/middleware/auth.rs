//! Bearer token authentication extractor.
//!
//! The gateway resolves a principal for every protected request:
//!
//! ```text
//! no token ──────────────────────────────────────────────► 401
//! token ─► fingerprint ─► cache hit ─────────────────────► Authenticated
//!                       └► cache miss ─► validate ─► put ─► Authenticated
//!                                                └► error ► 401 (or 503)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use puzzlequota_auth::middleware::{AuthState, BearerAuth};
//!
//! async fn protected_handler(BearerAuth(principal): BearerAuth) -> String {
//!     format!("Hello, {}!", principal.subject_id())
//! }
//!
//! let app = Router::new()
//!     .route("/protected", get(protected_handler))
//!     .with_state(auth_state);
//! ```

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
};

use crate::cache::PrincipalCache;
use crate::error::{AuthError, UPSTREAM_FAILURE_MESSAGE, USER_INFO_FAILURE_MESSAGE};
use crate::principal::{Principal, TokenFingerprint};
use crate::provider::IdentityResolver;

// =============================================================================
// Auth State
// =============================================================================

/// State required for bearer token authentication.
///
/// Include it in the application state and expose it to the `BearerAuth`
/// extractor via `FromRef`.
#[derive(Clone)]
pub struct AuthState {
    /// Validates tokens against the identity provider.
    pub resolver: Arc<dyn IdentityResolver>,

    /// Cache of validated principals.
    pub cache: Arc<dyn PrincipalCache>,

    /// Lifetime of cached principals.
    pub principal_ttl: Duration,

    /// Answer provider outages with 503 instead of folding them into 401.
    pub distinguish_upstream_errors: bool,
}

impl AuthState {
    /// Creates a new auth state with a one hour principal TTL.
    pub fn new(resolver: Arc<dyn IdentityResolver>, cache: Arc<dyn PrincipalCache>) -> Self {
        Self {
            resolver,
            cache,
            principal_ttl: Duration::from_secs(3600),
            distinguish_upstream_errors: false,
        }
    }

    /// Sets the principal cache TTL.
    #[must_use]
    pub fn with_principal_ttl(mut self, ttl: Duration) -> Self {
        self.principal_ttl = ttl;
        self
    }

    /// Enables or disables 503 responses for provider outages.
    #[must_use]
    pub fn with_distinguish_upstream_errors(mut self, enabled: bool) -> Self {
        self.distinguish_upstream_errors = enabled;
        self
    }

    /// Resolves a bearer token to a principal, consulting the cache first.
    ///
    /// # Errors
    ///
    /// Returns the resolver's error on a cache miss that fails validation.
    pub async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        let fingerprint = TokenFingerprint::of(token);

        if let Some(principal) = self.cache.get(&fingerprint).await {
            tracing::trace!(fingerprint = %fingerprint, "Principal cache hit");
            return Ok(principal);
        }

        tracing::debug!(fingerprint = %fingerprint, "Principal cache miss");
        let principal = self.resolver.validate(token).await?;
        self.cache
            .put(&fingerprint, &principal, self.principal_ttl)
            .await;

        Ok(principal)
    }

    /// Maps a validation failure to the error shown to the client.
    ///
    /// Upstream failure details stay in the logs.
    fn reject(&self, error: AuthError) -> AuthError {
        if !error.is_upstream() {
            return error;
        }

        if self.distinguish_upstream_errors {
            AuthError::upstream(UPSTREAM_FAILURE_MESSAGE)
        } else {
            AuthError::unauthenticated(USER_INFO_FAILURE_MESSAGE)
        }
    }
}

// =============================================================================
// Bearer Auth Extractor
// =============================================================================

/// Axum extractor that authenticates the request and yields its principal.
///
/// # Errors
///
/// Rejects with `AuthError` (which implements `IntoResponse`) if the
/// Authorization header is missing or malformed, or the token cannot be
/// validated.
pub struct BearerAuth(pub Principal);

impl<S> FromRequestParts<S> for BearerAuth
where
    S: Send + Sync,
    AuthState: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_state = AuthState::from_ref(state);

        let token = bearer_token(&parts.headers)?;

        let principal = auth_state.authenticate(token).await.map_err(|e| {
            tracing::debug!(error = %e, "Authentication failed");
            auth_state.reject(e)
        })?;

        Ok(BearerAuth(principal))
    }
}

/// Extracts the bearer token from the Authorization header.
///
/// # Errors
///
/// Returns `Unauthenticated` if the header is absent, not `Bearer <token>`,
/// or carries an empty token.
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let header = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AuthError::unauthenticated("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AuthError::unauthenticated("Invalid Authorization header"))?;

    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::unauthenticated("Invalid Authorization header"))
}

// =============================================================================
// Tests
// =============================================================================
