//! Tiered result cache for the Pathway gateway.
//!
//! Two tiers: a process-local map with per-entry expiry (L1) and an
//! optional distributed TTL store behind the [`RemoteStore`] trait (L2,
//! Redis in production). The cache is an optimization layer, never a
//! source of truth: every operation degrades to a miss or a no-op when a
//! tier misbehaves, and every value is re-derivable from the authoritative
//! backend services.
//!
//! Cache keys are built exclusively through the typed builders in
//! [`keys`]; the [`invalidation`] module maps each mutable entity type to
//! the keys that must be deleted when it changes.

pub mod error;
pub mod invalidation;
pub mod keys;
pub mod store;
pub mod tiered;

pub use error::CacheError;
pub use invalidation::{InvalidationCoordinator, RelatedIds};
pub use keys::QueryScope;
pub use store::{DynRemoteStore, MemoryStore, RedisStore, RemoteHit, RemoteStore};
pub use tiered::{TieredCache, TieredCacheBuilder};
