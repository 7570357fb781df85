//! Principal caching on top of the fast cache.
//!
//! Validated principals are stored as JSON under `userInfo:{fingerprint}`,
//! where the fingerprint is the SHA-256 of the bearer token. The raw token
//! never becomes part of a key.

use std::time::Duration;

use async_trait::async_trait;
use puzzlequota_auth::{Principal, PrincipalCache, TokenFingerprint};

use super::backend::CacheBackend;

/// Key prefix for cached principals.
pub const PRINCIPAL_KEY_PREFIX: &str = "userInfo";

/// Principal cache backed by [`CacheBackend`].
#[derive(Clone)]
pub struct KvPrincipalCache {
    backend: CacheBackend,
}

impl KvPrincipalCache {
    pub fn new(backend: CacheBackend) -> Self {
        Self { backend }
    }

    fn key(fingerprint: &TokenFingerprint) -> String {
        format!("{PRINCIPAL_KEY_PREFIX}:{fingerprint}")
    }
}

#[async_trait]
impl PrincipalCache for KvPrincipalCache {
    async fn get(&self, fingerprint: &TokenFingerprint) -> Option<Principal> {
        let raw = self.backend.get(&Self::key(fingerprint)).await?;
        match serde_json::from_str::<Principal>(&raw) {
            Ok(principal) => Some(principal),
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Discarding unreadable cached principal");
                None
            }
        }
    }

    async fn put(&self, fingerprint: &TokenFingerprint, principal: &Principal, ttl: Duration) {
        let value = match serde_json::to_string(principal) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode principal for caching");
                return;
            }
        };

        if let Err(e) = self.backend.set(&Self::key(fingerprint), &value, ttl).await {
            tracing::warn!(fingerprint = %fingerprint, error = %e, "Failed to cache principal");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn principal(sub: &str) -> Principal {
        Principal::from_claims(json!({
            "sub": sub,
            "name": "Ada",
            "custom_data": { "puzzleCount": 2 }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let backend = CacheBackend::new_local();
        let cache = KvPrincipalCache::new(backend.clone());
        let fp = TokenFingerprint::of("token-1");

        cache
            .put(&fp, &principal("u1"), Duration::from_secs(60))
            .await;

        let cached = cache.get(&fp).await.unwrap();
        assert_eq!(cached.subject_id(), "u1");
        assert_eq!(cached.claim("name"), Some(&json!("Ada")));
        assert_eq!(cached.custom_data().get("puzzleCount"), Some(&json!(2)));

        let key = format!("userInfo:{}", fp.as_str());
        assert!(backend.get(&key).await.is_some());
    }

    #[tokio::test]
    async fn test_different_tokens_do_not_collide() {
        let cache = KvPrincipalCache::new(CacheBackend::new_local());
        let a = TokenFingerprint::of("token-a");
        let b = TokenFingerprint::of("token-b");

        cache.put(&a, &principal("ua"), Duration::from_secs(60)).await;

        assert!(cache.get(&a).await.is_some());
        assert!(cache.get(&b).await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_a_miss() {
        let backend = CacheBackend::new_local();
        let cache = KvPrincipalCache::new(backend.clone());
        let fp = TokenFingerprint::of("token-1");

        backend
            .set(
                &format!("userInfo:{}", fp.as_str()),
                "{not json",
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert!(cache.get(&fp).await.is_none());
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let cache = KvPrincipalCache::new(CacheBackend::new_local());
        let fp = TokenFingerprint::of("token-1");

        cache
            .put(&fp, &principal("u1"), Duration::from_millis(10))
            .await;
        assert!(cache.get(&fp).await.is_some());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get(&fp).await.is_none());
    }
}
