use std::sync::Arc;

use super::{DurableCounter, QuotaConfig, QuotaError};
use crate::cache::CacheBackend;
use crate::reconcile::ReconcilerHandle;

/// Cache-first quota counter.
///
/// `read` is the only operation that consults the durable record, and only
/// when the cache has no usable value. `try_decrement` and `increment`
/// treat a cold cache as a balance of zero and hand the new value to the
/// reconciler after writing the cache.
///
/// Mutations are a plain read followed by a write. Concurrent mutations for
/// the same subject can overwrite each other.
pub struct QuotaStore {
    cache: CacheBackend,
    durable: Arc<dyn DurableCounter>,
    reconciler: ReconcilerHandle,
    config: QuotaConfig,
}

impl QuotaStore {
    pub fn new(
        cache: CacheBackend,
        durable: Arc<dyn DurableCounter>,
        reconciler: ReconcilerHandle,
        config: QuotaConfig,
    ) -> Self {
        Self {
            cache,
            durable,
            reconciler,
            config,
        }
    }

    /// Reconciler used for background durable writes.
    pub fn reconciler(&self) -> &ReconcilerHandle {
        &self.reconciler
    }

    fn key(&self, subject_id: &str) -> String {
        format!("{}:{}", self.config.key_prefix, subject_id)
    }

    /// Cached counter, or `None` when absent or unreadable.
    async fn cached_count(&self, key: &str) -> Option<u64> {
        let raw = self.cache.get(key).await?;
        match raw.trim().parse::<u64>() {
            Ok(count) => Some(count),
            Err(_) => {
                tracing::warn!(key = %key, "Ignoring unreadable cached counter");
                None
            }
        }
    }

    async fn write(&self, key: &str, count: u64) -> Result<(), QuotaError> {
        self.cache
            .set(key, &count.to_string(), self.config.ttl)
            .await?;
        Ok(())
    }

    /// Returns the subject's balance, initializing it on first use.
    ///
    /// # Errors
    ///
    /// `Upstream` if the cache is cold and the durable record cannot be read
    /// or initialized; `Cache` if the fetched value cannot be cached.
    pub async fn read(&self, subject_id: &str) -> Result<u64, QuotaError> {
        let key = self.key(subject_id);
        if let Some(count) = self.cached_count(&key).await {
            return Ok(count);
        }

        let count = match self.durable.load(subject_id).await? {
            Some(count) => count,
            None => {
                let initial = self.config.default_count;
                tracing::info!(subject = %subject_id, count = initial, "Initializing quota");
                self.durable.store(subject_id, initial).await?;
                initial
            }
        };

        self.write(&key, count).await?;
        tracing::debug!(subject = %subject_id, count, "Quota primed from durable record");
        Ok(count)
    }

    /// Spends one unit of quota.
    ///
    /// # Errors
    ///
    /// `Exhausted` when the cached balance is zero or absent; nothing is
    /// written in that case.
    pub async fn try_decrement(&self, subject_id: &str) -> Result<u64, QuotaError> {
        let key = self.key(subject_id);
        let current = self.cached_count(&key).await.unwrap_or(0);
        if current == 0 {
            return Err(QuotaError::Exhausted);
        }

        let count = current - 1;
        self.write(&key, count).await?;
        self.reconciler.dispatch(subject_id, count);

        tracing::debug!(subject = %subject_id, count, "Quota used");
        Ok(count)
    }

    /// Adds `delta` units of quota. A `delta` below 1 counts as 1.
    pub async fn increment(&self, subject_id: &str, delta: i64) -> Result<u64, QuotaError> {
        let delta = u64::try_from(delta).ok().filter(|d| *d > 0).unwrap_or(1);
        let key = self.key(subject_id);
        let current = self.cached_count(&key).await.unwrap_or(0);

        let count = current.saturating_add(delta);
        self.write(&key, count).await?;
        self.reconciler.dispatch(subject_id, count);

        tracing::debug!(subject = %subject_id, count, delta, "Quota added");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{ReconcileConfig, ReconcileEvent, Reconciler};
    use async_trait::async_trait;
    use puzzlequota_auth::AuthError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct MemoryDurable {
        records: Mutex<HashMap<String, u64>>,
        loads: AtomicUsize,
        unavailable: bool,
    }

    impl MemoryDurable {
        fn with(subject: &str, count: u64) -> Self {
            let durable = Self::default();
            durable
                .records
                .lock()
                .unwrap()
                .insert(subject.to_string(), count);
            durable
        }

        fn get(&self, subject: &str) -> Option<u64> {
            self.records.lock().unwrap().get(subject).copied()
        }
    }

    #[async_trait]
    impl DurableCounter for MemoryDurable {
        async fn load(&self, subject_id: &str) -> Result<Option<u64>, AuthError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.unavailable {
                return Err(AuthError::upstream("custom data unavailable"));
            }
            Ok(self.get(subject_id))
        }

        async fn store(&self, subject_id: &str, count: u64) -> Result<(), AuthError> {
            if self.unavailable {
                return Err(AuthError::upstream("custom data unavailable"));
            }
            self.records
                .lock()
                .unwrap()
                .insert(subject_id.to_string(), count);
            Ok(())
        }
    }

    fn store_with(durable: Arc<MemoryDurable>) -> (QuotaStore, CacheBackend) {
        let cache = CacheBackend::new_local();
        let reconciler = Reconciler::spawn(
            durable.clone(),
            ReconcileConfig {
                initial_backoff: Duration::from_millis(1),
                ..Default::default()
            },
        );
        let store = QuotaStore::new(cache.clone(), durable, reconciler, QuotaConfig::default());
        (store, cache)
    }

    async fn wait_for_success(
        events: &mut tokio::sync::broadcast::Receiver<ReconcileEvent>,
    ) -> ReconcileEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("timed out waiting for reconcile event")
                .unwrap();
            if matches!(event, ReconcileEvent::Succeeded { .. }) {
                return event;
            }
        }
    }

    #[tokio::test]
    async fn test_cold_read_initializes_default() {
        let durable = Arc::new(MemoryDurable::default());
        let (store, cache) = store_with(durable.clone());

        assert_eq!(store.read("u1").await.unwrap(), 1);
        assert_eq!(durable.get("u1"), Some(1));

        let entry = cache
            .local_cache()
            .unwrap()
            .get("puzzleCount:u1")
            .unwrap()
            .clone();
        assert_eq!(&*entry.value, "1");
        assert_eq!(entry.ttl, Duration::from_secs(2_592_000));
    }

    #[tokio::test]
    async fn test_cold_read_uses_durable_value() {
        let durable = Arc::new(MemoryDurable::with("u1", 5));
        let (store, cache) = store_with(durable.clone());

        assert_eq!(store.read("u1").await.unwrap(), 5);
        assert_eq!(cache.get("puzzleCount:u1").await.as_deref(), Some("5"));
        assert_eq!(durable.get("u1"), Some(5));
    }

    #[tokio::test]
    async fn test_warm_read_skips_durable() {
        let durable = Arc::new(MemoryDurable::with("u1", 5));
        let (store, _) = store_with(durable.clone());

        assert_eq!(store.read("u1").await.unwrap(), 5);
        assert_eq!(store.read("u1").await.unwrap(), 5);
        assert_eq!(durable.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cold_read_fails_when_durable_unavailable() {
        let durable = Arc::new(MemoryDurable {
            unavailable: true,
            ..Default::default()
        });
        let (store, cache) = store_with(durable);

        let err = store.read("u1").await.unwrap_err();
        assert!(matches!(err, QuotaError::Upstream(_)));
        assert!(cache.get("puzzleCount:u1").await.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_cached_value_is_refetched_on_read() {
        let durable = Arc::new(MemoryDurable::with("u1", 3));
        let (store, cache) = store_with(durable.clone());
        cache
            .set("puzzleCount:u1", "three", Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(store.read("u1").await.unwrap(), 3);
        assert_eq!(durable.loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_decrement_on_cold_cache_is_exhausted() {
        let durable = Arc::new(MemoryDurable::with("u1", 5));
        let (store, cache) = store_with(durable.clone());

        let err = store.try_decrement("u1").await.unwrap_err();
        assert!(matches!(err, QuotaError::Exhausted));
        assert!(cache.get("puzzleCount:u1").await.is_none());
        assert_eq!(durable.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_decrement_at_zero_writes_nothing() {
        let durable = Arc::new(MemoryDurable::default());
        let (store, cache) = store_with(durable);
        cache
            .set("puzzleCount:u1", "0", Duration::from_secs(60))
            .await
            .unwrap();

        assert!(matches!(
            store.try_decrement("u1").await,
            Err(QuotaError::Exhausted)
        ));

        // The short TTL would have been refreshed by a write.
        let entry = cache
            .local_cache()
            .unwrap()
            .get("puzzleCount:u1")
            .unwrap()
            .clone();
        assert_eq!(entry.ttl, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_decrement_writes_and_reconciles() {
        let durable = Arc::new(MemoryDurable::with("u1", 3));
        let (store, cache) = store_with(durable.clone());
        let mut events = store.reconciler().subscribe();

        assert_eq!(store.read("u1").await.unwrap(), 3);
        assert_eq!(store.try_decrement("u1").await.unwrap(), 2);
        assert_eq!(cache.get("puzzleCount:u1").await.as_deref(), Some("2"));

        let event = wait_for_success(&mut events).await;
        assert_eq!(event.subject_id(), "u1");
        assert_eq!(durable.get("u1"), Some(2));
    }

    #[tokio::test]
    async fn test_increment_non_positive_delta_counts_as_one() {
        let durable = Arc::new(MemoryDurable::default());
        let (store, _) = store_with(durable);

        assert_eq!(store.increment("u1", 0).await.unwrap(), 1);
        assert_eq!(store.increment("u1", -4).await.unwrap(), 2);
        assert_eq!(store.increment("u1", 3).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_increment_on_cold_cache_starts_from_zero() {
        let durable = Arc::new(MemoryDurable::with("u1", 10));
        let (store, _) = store_with(durable.clone());
        let mut events = store.reconciler().subscribe();

        assert_eq!(store.increment("u1", 2).await.unwrap(), 2);

        wait_for_success(&mut events).await;
        assert_eq!(durable.get("u1"), Some(2));
        assert_eq!(durable.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_increment_saturates() {
        let durable = Arc::new(MemoryDurable::default());
        let (store, cache) = store_with(durable);
        cache
            .set(
                "puzzleCount:u1",
                &u64::MAX.to_string(),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert_eq!(store.increment("u1", 5).await.unwrap(), u64::MAX);
    }

    #[tokio::test]
    async fn test_concurrent_decrements_never_go_negative() {
        let durable = Arc::new(MemoryDurable::with("u1", 1));
        let (store, cache) = store_with(durable);
        assert_eq!(store.read("u1").await.unwrap(), 1);

        let (a, b) = tokio::join!(store.try_decrement("u1"), store.try_decrement("u1"));

        // Both may succeed (lost update); neither may go below zero.
        let successes: Vec<u64> = [a, b].into_iter().filter_map(Result::ok).collect();
        assert!(!successes.is_empty());
        assert!(successes.iter().all(|c| *c == 0));
        assert_eq!(cache.get("puzzleCount:u1").await.as_deref(), Some("0"));
    }
}
