//! HTTP middleware for authentication.
//!
//! This module provides the Axum side of the auth gateway:
//!
//! - Bearer token extraction
//! - Principal resolution through the principal cache and identity resolver
//! - Plain-text error responses with `WWW-Authenticate` challenges
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use puzzlequota_auth::middleware::{AuthState, BearerAuth};
//!
//! async fn protected_handler(BearerAuth(principal): BearerAuth) -> String {
//!     principal.subject_id().to_string()
//! }
//!
//! let auth_state = AuthState::new(resolver, principal_cache);
//!
//! let app = Router::new()
//!     .route("/protected", get(protected_handler))
//!     .with_state(auth_state);
//! ```

pub mod auth;
pub mod error;

pub use auth::{AuthState, BearerAuth, bearer_token};
pub use error::TEXT_PLAIN_UTF8;
