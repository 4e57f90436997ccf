//! The two-tier cache.
//!
//! L1 is a process-local [`DashMap`] with per-entry expiry and a bounded
//! capacity; L2 is an optional [`RemoteStore`]. Reads check L1, then L2
//! (promoting hits into L1); writes go to both. Any tier failure degrades
//! to a miss or a no-op with a log line — a cache problem must never fail
//! the caller's request.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CacheError;
use crate::store::DynRemoteStore;

/// Default TTL applied when a write does not specify one.
///
/// No entry is ever stored without an expiry: an absent TTL resolves to
/// this default, never to "forever".
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default bound on the number of L1 entries.
pub const DEFAULT_LOCAL_CAPACITY: usize = 10_000;

struct LocalEntry {
    payload: String,
    expires_at: Instant,
}

impl LocalEntry {
    fn is_expired(&self) -> bool {
        self.expires_at <= Instant::now()
    }
}

/// Two-tier serialized-value cache with TTL on every entry.
pub struct TieredCache {
    local: DashMap<String, LocalEntry>,
    local_capacity: usize,
    remote: Option<DynRemoteStore>,
    default_ttl: Duration,
}

impl TieredCache {
    /// Creates a cache with default TTL and capacity and no remote tier.
    #[must_use]
    pub fn local_only() -> Self {
        TieredCacheBuilder::new().build()
    }

    /// Starts building a cache.
    #[must_use]
    pub fn builder() -> TieredCacheBuilder {
        TieredCacheBuilder::new()
    }

    /// The TTL applied when a write omits one.
    #[must_use]
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Fetches and deserializes a value.
    ///
    /// Returns `None` on absence, expiry, a payload that fails to parse,
    /// or any remote-tier failure. Never surfaces an error.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(payload) = self.get_local(key) {
            return self.parse(key, &payload);
        }

        let remote = self.remote.as_ref()?;
        match remote.get(key).await {
            Ok(Some(hit)) => {
                // Promote into L1 for the entry's remaining lifetime, so
                // the local copy never outlives the distributed one.
                let ttl = hit.ttl.unwrap_or(self.default_ttl);
                self.insert_local(key.to_string(), hit.payload.clone(), ttl);
                self.parse(key, &hit.payload)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Remote cache read failed; treating as miss");
                None
            }
        }
    }

    /// Serializes and stores a value in both tiers.
    ///
    /// `ttl` falls back to the component default. Failures are logged and
    /// swallowed.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to serialize cache value; skipping write");
                return;
            }
        };

        self.insert_local(key.to_string(), payload.clone(), ttl);

        if let Some(remote) = &self.remote {
            if let Err(e) = remote.set(key, &payload, ttl).await {
                tracing::warn!(key = %key, error = %e, "Remote cache write failed");
            }
        }
    }

    /// Deletes a key from both tiers.
    ///
    /// Unlike reads and writes, deletion failures propagate: the
    /// invalidation coordinator must know when a stale entry may have
    /// survived.
    pub async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.local.remove(key);
        if let Some(remote) = &self.remote {
            remote.del(key).await?;
        }
        Ok(())
    }

    /// Fetches many values; results match the input key order.
    ///
    /// Semantics are identical to issuing [`TieredCache::get`] per key,
    /// with one remote round trip for the L1 misses.
    pub async fn mget<T: DeserializeOwned>(&self, keys: &[String]) -> Vec<Option<T>> {
        let mut results: Vec<Option<T>> = Vec::with_capacity(keys.len());
        let mut missing: Vec<(usize, String)> = Vec::new();

        for (index, key) in keys.iter().enumerate() {
            match self.get_local(key) {
                Some(payload) => results.push(self.parse(key, &payload)),
                None => {
                    results.push(None);
                    missing.push((index, key.clone()));
                }
            }
        }

        let Some(remote) = &self.remote else {
            return results;
        };
        if missing.is_empty() {
            return results;
        }

        let remote_keys: Vec<String> = missing.iter().map(|(_, k)| k.clone()).collect();
        match remote.mget(&remote_keys).await {
            Ok(values) if values.len() == remote_keys.len() => {
                for ((index, key), hit) in missing.into_iter().zip(values) {
                    if let Some(hit) = hit {
                        let ttl = hit.ttl.unwrap_or(self.default_ttl);
                        self.insert_local(key.clone(), hit.payload.clone(), ttl);
                        results[index] = self.parse(&key, &hit.payload);
                    }
                }
            }
            Ok(values) => {
                tracing::warn!(
                    requested = remote_keys.len(),
                    returned = values.len(),
                    "Remote mget returned wrong arity; treating batch as miss"
                );
            }
            Err(e) => {
                tracing::warn!(error = %e, "Remote cache mget failed; treating batch as miss");
            }
        }

        results
    }

    /// Stores many values with a shared TTL.
    pub async fn mset<T: Serialize>(&self, entries: &[(String, T)], ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut serialized: Vec<(String, String)> = Vec::with_capacity(entries.len());

        for (key, value) in entries {
            match serde_json::to_string(value) {
                Ok(payload) => {
                    self.insert_local(key.clone(), payload.clone(), ttl);
                    serialized.push((key.clone(), payload));
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to serialize cache value; skipping entry");
                }
            }
        }

        if let Some(remote) = &self.remote {
            if let Err(e) = remote.mset(&serialized, ttl).await {
                tracing::warn!(error = %e, "Remote cache mset failed");
            }
        }
    }

    /// Deletes every key starting with `prefix` from both tiers.
    ///
    /// # Errors
    ///
    /// Propagates remote-tier failures, as [`TieredCache::del`] does.
    pub async fn del_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        self.local.retain(|key, _| !key.starts_with(prefix));
        match &self.remote {
            Some(remote) => remote.del_prefix(prefix).await,
            None => Ok(0),
        }
    }

    /// Destructively clears both tiers.
    ///
    /// Correctness-safe but discards every tenant's cached data; prefer
    /// scoped invalidation.
    ///
    /// # Errors
    ///
    /// Propagates remote-tier failures.
    pub async fn flush(&self) -> Result<(), CacheError> {
        self.local.clear();
        if let Some(remote) = &self.remote {
            remote.flush().await?;
        }
        tracing::info!("Cache flushed");
        Ok(())
    }

    fn get_local(&self, key: &str) -> Option<String> {
        match self.local.get(key) {
            Some(entry) if !entry.is_expired() => Some(entry.payload.clone()),
            Some(_) => {
                drop(self.local.remove(key));
                None
            }
            None => None,
        }
    }

    fn insert_local(&self, key: String, payload: String, ttl: Duration) {
        // Bound L1 growth; eviction order is arbitrary, which is fine for
        // an optimization tier.
        if self.local.len() >= self.local_capacity && !self.local.contains_key(&key) {
            // The iterator's shard guard must drop before `remove` takes
            // the shard's write lock.
            let victim = self.local.iter().next().map(|e| e.key().clone());
            if let Some(victim) = victim {
                self.local.remove(&victim);
                tracing::debug!(key = %victim, "Evicted local cache entry");
            }
        }

        self.local.insert(
            key,
            LocalEntry {
                payload,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    fn parse<T: DeserializeOwned>(&self, key: &str, payload: &str) -> Option<T> {
        match serde_json::from_str(payload) {
            Ok(value) => Some(value),
            Err(e) => {
                // A corrupt payload is a miss, never an error.
                tracing::debug!(key = %key, error = %e, "Cached payload failed to parse; dropping entry");
                self.local.remove(key);
                None
            }
        }
    }
}

/// Builder for [`TieredCache`].
pub struct TieredCacheBuilder {
    remote: Option<DynRemoteStore>,
    default_ttl: Duration,
    local_capacity: usize,
}

impl TieredCacheBuilder {
    /// Creates a builder with default TTL and capacity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            remote: None,
            default_ttl: DEFAULT_TTL,
            local_capacity: DEFAULT_LOCAL_CAPACITY,
        }
    }

    /// Attaches a distributed L2 store.
    #[must_use]
    pub fn with_remote(mut self, remote: DynRemoteStore) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Sets the TTL applied when writes omit one.
    #[must_use]
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Bounds the number of L1 entries.
    #[must_use]
    pub fn with_local_capacity(mut self, capacity: usize) -> Self {
        self.local_capacity = capacity.max(1);
        self
    }

    /// Builds the cache.
    #[must_use]
    pub fn build(self) -> TieredCache {
        TieredCache {
            local: DashMap::new(),
            local_capacity: self.local_capacity,
            remote: self.remote,
            default_ttl: self.default_ttl,
        }
    }
}

impl Default for TieredCacheBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, RemoteStore};
    use serde::{Deserialize, Serialize};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Doc {
        id: String,
        n: u32,
    }

    fn doc(id: &str, n: u32) -> Doc {
        Doc { id: id.into(), n }
    }

    fn tiered(store: Arc<MemoryStore>) -> TieredCache {
        TieredCache::builder()
            .with_remote(store)
            .with_default_ttl(Duration::from_secs(60))
            .build()
    }

    #[tokio::test]
    async fn test_set_get_round_trip() {
        let cache = tiered(Arc::new(MemoryStore::new()));
        cache.set("doc:1", &doc("1", 7), None).await;

        let got: Option<Doc> = cache.get("doc:1").await;
        assert_eq!(got, Some(doc("1", 7)));
    }

    #[tokio::test]
    async fn test_get_after_ttl_expiry_is_absent() {
        let cache = tiered(Arc::new(MemoryStore::new()));
        cache
            .set("doc:1", &doc("1", 7), Some(Duration::from_millis(20)))
            .await;

        tokio::time::sleep(Duration::from_millis(40)).await;
        let got: Option<Doc> = cache.get("doc:1").await;
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_remote_hit_promotes_to_local() {
        let store = Arc::new(MemoryStore::new());
        let payload = serde_json::to_string(&doc("1", 7)).unwrap();
        store
            .set("doc:1", &payload, Duration::from_secs(60))
            .await
            .unwrap();

        let cache = tiered(store.clone());
        let got: Option<Doc> = cache.get("doc:1").await;
        assert_eq!(got, Some(doc("1", 7)));

        // A second read is served from L1 even if the remote entry is gone.
        store.del("doc:1").await.unwrap();
        let got: Option<Doc> = cache.get("doc:1").await;
        assert_eq!(got, Some(doc("1", 7)));
    }

    #[tokio::test]
    async fn test_promotion_keeps_remaining_ttl() {
        // Two gateway instances share the distributed tier; the reader's
        // promoted L1 copy must expire with the original entry, not with
        // the reader's default TTL.
        let store = Arc::new(MemoryStore::new());
        let writer = tiered(store.clone());
        let reader = tiered(store.clone());

        writer
            .set("doc:1", &doc("1", 7), Some(Duration::from_millis(50)))
            .await;

        let got: Option<Doc> = reader.get("doc:1").await;
        assert_eq!(got, Some(doc("1", 7)));

        tokio::time::sleep(Duration::from_millis(80)).await;
        let got: Option<Doc> = reader.get("doc:1").await;
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_a_miss() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("doc:1", "{not json", Duration::from_secs(60))
            .await
            .unwrap();

        let cache = tiered(store);
        let got: Option<Doc> = cache.get("doc:1").await;
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_mget_matches_input_order() {
        let cache = tiered(Arc::new(MemoryStore::new()));
        cache.set("doc:a", &doc("a", 1), None).await;
        cache.set("doc:c", &doc("c", 3), None).await;

        let got: Vec<Option<Doc>> = cache
            .mget(&["doc:a".into(), "doc:b".into(), "doc:c".into()])
            .await;
        assert_eq!(got, vec![Some(doc("a", 1)), None, Some(doc("c", 3))]);
    }

    #[tokio::test]
    async fn test_mset_then_individual_get() {
        let cache = tiered(Arc::new(MemoryStore::new()));
        cache
            .mset(
                &[
                    ("doc:a".to_string(), doc("a", 1)),
                    ("doc:b".to_string(), doc("b", 2)),
                ],
                None,
            )
            .await;

        let got: Option<Doc> = cache.get("doc:b").await;
        assert_eq!(got, Some(doc("b", 2)));
    }

    #[tokio::test]
    async fn test_del_removes_both_tiers() {
        let store = Arc::new(MemoryStore::new());
        let cache = tiered(store.clone());
        cache.set("doc:1", &doc("1", 7), None).await;

        cache.del("doc:1").await.unwrap();
        let got: Option<Doc> = cache.get("doc:1").await;
        assert_eq!(got, None);
        assert!(store.get("doc:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_flush_clears_everything() {
        let cache = tiered(Arc::new(MemoryStore::new()));
        cache.set("doc:1", &doc("1", 1), None).await;
        cache.set("doc:2", &doc("2", 2), None).await;

        cache.flush().await.unwrap();
        let got: Option<Doc> = cache.get("doc:1").await;
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_local_capacity_eviction() {
        let cache = TieredCache::builder().with_local_capacity(2).build();
        cache.set("doc:1", &doc("1", 1), None).await;
        cache.set("doc:2", &doc("2", 2), None).await;
        cache.set("doc:3", &doc("3", 3), None).await;

        let live = ["doc:1", "doc:2", "doc:3"]
            .iter()
            .filter(|k| cache.get_local(k).is_some())
            .count();
        assert_eq!(live, 2);
    }

    #[tokio::test]
    async fn test_local_only_cache_works_without_remote() {
        let cache = TieredCache::local_only();
        cache.set("doc:1", &doc("1", 1), None).await;

        let got: Option<Doc> = cache.get("doc:1").await;
        assert_eq!(got, Some(doc("1", 1)));
        assert_eq!(cache.del_prefix("doc:").await.unwrap(), 0);
    }
}
