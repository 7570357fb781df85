//! # puzzlequota-auth
//!
//! Authentication and identity provider integration for PuzzleQuota.
//!
//! This crate provides:
//! - Bearer token validation against the provider's userinfo endpoint
//! - Principal caching keyed by token fingerprints
//! - Management credentials via the client credentials grant
//! - Access to the provider's per-user custom data (the durable record)
//! - An Axum extractor that gates protected routes
//!
//! ## Modules
//!
//! - [`config`] - Identity provider configuration
//! - [`principal`] - Principal and token fingerprint types
//! - [`cache`] - Principal cache contract
//! - [`provider`] - Identity provider HTTP clients
//! - [`middleware`] - Axum extractor and error responses

pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod principal;
pub mod provider;

pub use cache::{NoOpPrincipalCache, PrincipalCache};
pub use config::{ConfigError, IdentityConfig};
pub use error::{AuthError, ProviderError, UPSTREAM_FAILURE_MESSAGE, USER_INFO_FAILURE_MESSAGE};
pub use middleware::{AuthState, BearerAuth};
pub use principal::{Principal, TokenFingerprint};
pub use provider::{
    ClientCredentialsProvider, CustomDataClient, HttpIdentityResolver, IdentityResolver,
    ManagementCredential, ManagementTokenProvider, build_http_client,
};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;
