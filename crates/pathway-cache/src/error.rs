//! Error types for cache operations.
//!
//! These errors stay inside the cache layer: read paths degrade to a miss
//! and write paths to a no-op, with a log line. Only the invalidation
//! coordinator propagates them, because a failed deletion is a correctness
//! bug rather than a lost optimization.

/// Errors from the local or distributed cache tier.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to obtain a connection from the pool.
    #[error("Cache connection error: {0}")]
    Connection(String),

    /// The store rejected or failed an operation.
    #[error("Cache operation error: {0}")]
    Operation(String),

    /// A value could not be serialized for storage.
    #[error("Cache encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}

impl CacheError {
    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Creates a new `Operation` error.
    #[must_use]
    pub fn operation(msg: impl Into<String>) -> Self {
        Self::Operation(msg.into())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::Operation(err.to_string())
    }
}
