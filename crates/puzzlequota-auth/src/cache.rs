//! Principal caching contract.
//!
//! The gateway uses a read-through pattern: on a miss it validates the token
//! with the identity resolver and then stores the principal. Implementations
//! must treat unreadable entries as a miss rather than an error, so a
//! corrupted cache never fails a request.

use std::time::Duration;

use async_trait::async_trait;

use crate::principal::{Principal, TokenFingerprint};

/// Cache of validated principals keyed by token fingerprint.
#[async_trait]
pub trait PrincipalCache: Send + Sync {
    /// Gets a cached principal.
    ///
    /// Returns `None` if the entry doesn't exist, has expired, or cannot be decoded.
    async fn get(&self, fingerprint: &TokenFingerprint) -> Option<Principal>;

    /// Stores a principal for `ttl`.
    ///
    /// Write failures are logged by the implementation and otherwise ignored.
    async fn put(&self, fingerprint: &TokenFingerprint, principal: &Principal, ttl: Duration);
}

/// A cache that never stores anything, used when principal caching is disabled.
pub struct NoOpPrincipalCache;

#[async_trait]
impl PrincipalCache for NoOpPrincipalCache {
    async fn get(&self, _fingerprint: &TokenFingerprint) -> Option<Principal> {
        None
    }

    async fn put(&self, _fingerprint: &TokenFingerprint, _principal: &Principal, _ttl: Duration) {
        // No-op
    }
}
