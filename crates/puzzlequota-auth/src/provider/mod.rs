//! Identity provider integration.
//!
//! This module talks to the external identity provider over HTTP:
//!
//! - [`userinfo`] - validates bearer tokens against the userinfo endpoint
//! - [`management`] - obtains management credentials via client credentials
//! - [`custom_data`] - reads and patches per-user custom data (durable record)
//!
//! The provider itself is a black box; every request/response contract used
//! here is documented on the individual clients.

pub mod custom_data;
pub mod management;
pub mod userinfo;

pub use custom_data::CustomDataClient;
pub use management::{ClientCredentialsProvider, ManagementCredential, ManagementTokenProvider};
pub use userinfo::{HttpIdentityResolver, IdentityResolver};

use crate::config::IdentityConfig;

/// Builds the HTTP client shared by all provider clients.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_http_client(config: &IdentityConfig) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .user_agent(concat!("puzzlequota/", env!("CARGO_PKG_VERSION")))
        .build()
}
