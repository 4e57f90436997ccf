//! Batched, request-scoped entity loading.
//!
//! [`Batcher`] is the generic deferred-batch dispatcher; [`StudentLoader`],
//! [`IepLoader`], and [`StudentIepsLoader`] are the concrete loaders that
//! read through the tiered cache and batch backend calls. [`Loaders`]
//! bundles one of each per request so batching and memoization stay
//! request-scoped.

mod batch;
mod iep;
mod student;

pub use batch::{BatchFetch, Batcher, LoadResult, LoaderError};
pub use iep::{IepLoader, StudentIepsLoader};
pub use student::StudentLoader;

use std::sync::Arc;
use std::time::Duration;

use pathway_cache::TieredCache;
use pathway_clients::ClientRegistry;

/// Default debounce for the batch window.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(2);

/// The per-request loader set.
///
/// Created once per GraphQL execution; dropping it discards every
/// request-scoped memo.
#[derive(Clone)]
pub struct Loaders {
    /// Learner records by id.
    pub students: StudentLoader,
    /// IEP documents by id.
    pub ieps: IepLoader,
    /// IEP listings by learner id.
    pub student_ieps: StudentIepsLoader,
}

impl Loaders {
    /// Creates the loader set for one request.
    ///
    /// `token` is the caller's bearer token, propagated on every backend
    /// call the loaders make.
    #[must_use]
    pub fn new(
        registry: &ClientRegistry,
        cache: Arc<TieredCache>,
        token: String,
        delay: Duration,
    ) -> Self {
        Self {
            students: StudentLoader::new(
                registry.students.clone(),
                cache.clone(),
                token.clone(),
                delay,
            ),
            ieps: IepLoader::new(registry.ieps.clone(), cache.clone(), token.clone(), delay),
            student_ieps: StudentIepsLoader::new(registry.ieps.clone(), cache, token, delay),
        }
    }

    /// Propagates cancellation: open windows complete, new ones are
    /// refused.
    pub fn cancel(&self) {
        self.students.cancel();
        self.ieps.cancel();
        self.student_ieps.cancel();
    }
}

impl std::fmt::Debug for Loaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loaders")
            .field("students", &"StudentLoader")
            .field("ieps", &"IepLoader")
            .field("student_ieps", &"StudentIepsLoader")
            .finish()
    }
}
