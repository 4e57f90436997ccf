//! The distributed (L2) store abstraction.
//!
//! [`RemoteStore`] is the narrow contract the tiered cache needs from a
//! TTL-capable key-value store: get, set-with-expiry, delete, multi-get,
//! multi-set, prefix deletion, and a destructive flush. [`RedisStore`] is
//! the production implementation over a deadpool connection pool;
//! [`MemoryStore`] backs single-node deployments and tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;

use crate::error::CacheError;

/// A value fetched from the distributed tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteHit {
    /// The stored payload.
    pub payload: String,
    /// Remaining lifetime at read time; `None` when the store reports no
    /// expiry for the key.
    pub ttl: Option<Duration>,
}

/// TTL-capable key-value store used as the distributed cache tier.
///
/// Values are transport-safe strings; serialization happens above this
/// trait. Reads carry the key's remaining lifetime so a promoting tier
/// never outlives the distributed entry. Implementations must tolerate
/// concurrent writers; last-write-wins is acceptable because every cached
/// value is re-derivable.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetches a value with its remaining lifetime, `None` when absent or
    /// expired.
    async fn get(&self, key: &str) -> Result<Option<RemoteHit>, CacheError>;

    /// Stores a value with the given expiry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Deletes a key. Deleting an absent key is not an error.
    async fn del(&self, key: &str) -> Result<(), CacheError>;

    /// Fetches many values in one round trip; results match input order.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<RemoteHit>>, CacheError>;

    /// Stores many values with a shared expiry in one round trip.
    async fn mset(&self, entries: &[(String, String)], ttl: Duration) -> Result<(), CacheError>;

    /// Deletes every key starting with `prefix`; returns the count deleted.
    async fn del_prefix(&self, prefix: &str) -> Result<u64, CacheError>;

    /// Destructively clears the whole store.
    async fn flush(&self) -> Result<(), CacheError>;
}

/// Shared reference to a remote store implementation.
pub type DynRemoteStore = Arc<dyn RemoteStore>;

// =============================================================================
// Redis implementation
// =============================================================================

/// Redis-backed [`RemoteStore`] over a deadpool connection pool.
pub struct RedisStore {
    pool: deadpool_redis::Pool,
}

impl RedisStore {
    /// Wraps an existing connection pool.
    #[must_use]
    pub fn new(pool: deadpool_redis::Pool) -> Self {
        Self { pool }
    }

    /// Creates a store from a Redis URL (`redis://host:port/db`).
    ///
    /// # Errors
    ///
    /// Returns a connection error if the pool cannot be configured.
    pub fn from_url(url: &str) -> Result<Self, CacheError> {
        let config = deadpool_redis::Config::from_url(url);
        let pool = config
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| CacheError::connection(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::connection(e.to_string()))
    }
}

/// Maps a Redis `TTL` reply (seconds; negative for "missing" or "no
/// expiry") to a remaining lifetime.
fn remaining_ttl(seconds: i64) -> Option<Duration> {
    (seconds > 0).then(|| Duration::from_secs(seconds as u64))
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<RemoteHit>, CacheError> {
        let mut conn = self.conn().await?;
        let (payload, ttl_seconds): (Option<String>, i64) = redis::pipe()
            .get(key)
            .ttl(key)
            .query_async(&mut conn)
            .await?;

        Ok(payload.map(|payload| RemoteHit {
            payload,
            ttl: remaining_ttl(ttl_seconds),
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        let seconds = ttl.as_secs().max(1);
        let _: () = conn.set_ex(key, value, seconds).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<RemoteHit>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn().await?;

        // One pipeline carrying GET + TTL per key, so every hit arrives
        // with its remaining lifetime.
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.get(key).ttl(key);
        }
        let raw: Vec<redis::Value> = pipe.query_async(&mut conn).await?;

        let mut hits = Vec::with_capacity(keys.len());
        for pair in raw.chunks_exact(2) {
            let payload: Option<String> = redis::from_redis_value(&pair[0])?;
            let ttl_seconds: i64 = redis::from_redis_value(&pair[1])?;
            hits.push(payload.map(|payload| RemoteHit {
                payload,
                ttl: remaining_ttl(ttl_seconds),
            }));
        }
        Ok(hits)
    }

    async fn mset(&self, entries: &[(String, String)], ttl: Duration) -> Result<(), CacheError> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let seconds = ttl.as_secs().max(1);

        // MSET cannot carry expiries; pipeline SETEX instead.
        let mut pipe = redis::pipe();
        for (key, value) in entries {
            pipe.set_ex(key, value, seconds).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn del_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let mut conn = self.conn().await?;
        let pattern = format!("{prefix}*");

        let keys: Vec<String> = {
            let mut iter = conn.scan_match::<_, String>(&pattern).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        if keys.is_empty() {
            return Ok(0);
        }

        let deleted: u64 = conn.del(&keys).await?;
        Ok(deleted)
    }

    async fn flush(&self) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }
}

// =============================================================================
// In-memory implementation
// =============================================================================

/// In-process [`RemoteStore`] with real TTL behavior.
///
/// Backs tests and single-node deployments where a Redis instance would be
/// overhead. Expiry is checked lazily on read.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.value().1 > now).count()
    }

    /// Returns `true` if the store holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<RemoteHit>, CacheError> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.value().1 > now => Ok(Some(RemoteHit {
                payload: entry.value().0.clone(),
                ttl: Some(entry.value().1 - now),
            })),
            Some(_) => {
                drop(self.entries.remove(key));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<RemoteHit>>, CacheError> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    async fn mset(&self, entries: &[(String, String)], ttl: Duration) -> Result<(), CacheError> {
        for (key, value) in entries {
            self.set(key, value, ttl).await?;
        }
        Ok(())
    }

    async fn del_prefix(&self, prefix: &str) -> Result<u64, CacheError> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok((before - self.entries.len()) as u64)
    }

    async fn flush(&self) -> Result<(), CacheError> {
        self.entries.clear();
        Ok(())
    }
}
