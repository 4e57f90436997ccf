//! The Pathway gateway's per-request data-access layer.
//!
//! An incoming GraphQL request flows through this crate in a fixed order:
//! the access guard verifies the caller's token and role, resolvers fetch
//! entities through per-request batching loaders, the loaders read through
//! the tiered cache and coalesce backend calls, and mutations finish by
//! invalidating the cache keys they made stale — all before the mutation
//! is acknowledged.
//!
//! The building blocks:
//!
//! - [`loader`] — a generic deferred-batch dispatcher plus the concrete
//!   entity loaders, created fresh for every request so memoization and
//!   batching never cross request boundaries.
//! - [`context`] — [`GatewayContext`], the builder-validated bundle of
//!   shared state (clients, cache, invalidator, guard) and request state
//!   (auth context, bearer token, loaders, cancellation flag).
//! - [`operations`] — the guarded query and mutation bodies the external
//!   schema engine binds its resolvers to.
//! - [`config`] — deployment configuration.

pub mod config;
pub mod context;
pub mod error;
pub mod loader;
pub mod operations;

pub use config::GatewayConfig;
pub use context::{ContextBuilderError, GatewayContext, GatewayContextBuilder};
pub use error::GatewayError;
pub use loader::{BatchFetch, Batcher, LoadResult, LoaderError, Loaders};
