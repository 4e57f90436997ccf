//! IEP loaders: "IEP by id" and "all IEPs for a learner".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pathway_cache::{TieredCache, keys};
use pathway_clients::DynIepApi;
use pathway_core::{EntityType, Iep};
use tracing::instrument;

use super::batch::{BatchFetch, Batcher, LoadResult, LoaderError};

// =============================================================================
// IEP by id
// =============================================================================

/// Batch function for IEP documents by id.
pub struct IepFetch {
    ieps: DynIepApi,
    cache: Arc<TieredCache>,
    token: String,
}

#[async_trait]
impl BatchFetch for IepFetch {
    type Key = String;
    type Value = Iep;

    #[instrument(skip(self, ids), fields(key_count = ids.len()))]
    async fn fetch(
        &self,
        ids: &[String],
    ) -> Result<Vec<Result<Option<Iep>, LoaderError>>, LoaderError> {
        let cache_keys: Vec<String> = ids
            .iter()
            .map(|id| keys::entity_key(EntityType::Iep, id))
            .collect();
        let cached: Vec<Option<Iep>> = self.cache.mget(&cache_keys).await;

        let missing: Vec<(usize, String)> = cached
            .iter()
            .enumerate()
            .filter(|(_, hit)| hit.is_none())
            .map(|(index, _)| (index, ids[index].clone()))
            .collect();

        let mut results: Vec<Result<Option<Iep>, LoaderError>> =
            cached.into_iter().map(Ok).collect();

        if missing.is_empty() {
            return Ok(results);
        }

        let missing_ids: Vec<String> = missing.iter().map(|(_, id)| id.clone()).collect();
        match self.ieps.get_ieps(&missing_ids, &self.token).await {
            Ok(fetched) if fetched.len() == missing.len() => {
                let mut write_back: Vec<(String, Iep)> = Vec::new();
                for ((index, id), iep) in missing.into_iter().zip(fetched) {
                    if let Some(iep) = &iep {
                        write_back
                            .push((keys::entity_key(EntityType::Iep, id.as_str()), iep.clone()));
                    }
                    results[index] = Ok(iep);
                }
                if !write_back.is_empty() {
                    self.cache.mset(&write_back, None).await;
                }
            }
            Ok(fetched) => {
                tracing::error!(
                    requested = missing.len(),
                    returned = fetched.len(),
                    "IEP batch endpoint returned mismatched result count"
                );
                let requested = missing.len();
                for (index, _) in missing {
                    results[index] = Err(LoaderError::ProtocolMismatch {
                        requested,
                        returned: fetched.len(),
                    });
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "IEP batch fetch failed");
                for (index, _) in missing {
                    results[index] = Err(LoaderError::Backend(e.clone()));
                }
            }
        }

        Ok(results)
    }
}

/// Per-request IEP-by-id loader.
#[derive(Clone)]
pub struct IepLoader {
    batcher: Batcher<IepFetch>,
}

impl IepLoader {
    /// Creates a loader for one request.
    #[must_use]
    pub fn new(ieps: DynIepApi, cache: Arc<TieredCache>, token: String, delay: Duration) -> Self {
        Self {
            batcher: Batcher::new(IepFetch { ieps, cache, token }, delay),
        }
    }

    /// Loads one IEP by id.
    pub async fn load(&self, id: impl Into<String>) -> LoadResult<Iep> {
        self.batcher.load(id.into()).await
    }

    /// Loads many IEPs; results match input order.
    pub async fn load_many(&self, ids: Vec<String>) -> Vec<LoadResult<Iep>> {
        self.batcher.load_many(ids).await
    }

    /// Drops one id from the request-scoped memo.
    pub async fn clear(&self, id: &str) {
        self.batcher.clear(&id.to_string()).await;
    }

    /// Drops the whole request-scoped memo.
    pub async fn clear_all(&self) {
        self.batcher.clear_all().await;
    }

    /// Forces the open window to dispatch.
    pub async fn flush(&self) {
        self.batcher.flush().await;
    }

    pub(crate) fn cancel(&self) {
        self.batcher.cancel();
    }
}

// =============================================================================
// IEPs by learner
// =============================================================================

/// Batch function for per-learner IEP listings.
///
/// The IEP service has no multi-learner listing endpoint, so misses fan
/// out to one call per learner, issued concurrently within the window.
pub struct StudentIepsFetch {
    ieps: DynIepApi,
    cache: Arc<TieredCache>,
    token: String,
}

#[async_trait]
impl BatchFetch for StudentIepsFetch {
    type Key = String;
    type Value = Vec<Iep>;

    #[instrument(skip(self, student_ids), fields(key_count = student_ids.len()))]
    async fn fetch(
        &self,
        student_ids: &[String],
    ) -> Result<Vec<Result<Option<Vec<Iep>>, LoaderError>>, LoaderError> {
        let mut results: Vec<Result<Option<Vec<Iep>>, LoaderError>> =
            Vec::with_capacity(student_ids.len());

        let cache_keys: Vec<String> = student_ids
            .iter()
            .map(|id| keys::student_ieps_key(id))
            .collect();
        let cached: Vec<Option<Vec<Iep>>> = self.cache.mget(&cache_keys).await;

        let mut pending: Vec<(usize, String)> = Vec::new();
        for (index, (student_id, hit)) in student_ids.iter().zip(cached).enumerate() {
            match hit {
                Some(listing) => results.push(Ok(Some(listing))),
                None => {
                    results.push(Ok(None));
                    pending.push((index, student_id.clone()));
                }
            }
        }

        let fetched = futures_util::future::join_all(
            pending
                .iter()
                .map(|(_, student_id)| self.ieps.ieps_for_student(student_id, &self.token)),
        )
        .await;

        for ((index, student_id), outcome) in pending.into_iter().zip(fetched) {
            match outcome {
                Ok(listing) => {
                    self.cache
                        .set(&keys::student_ieps_key(&student_id), &listing, None)
                        .await;
                    results[index] = Ok(Some(listing));
                }
                Err(e) => {
                    tracing::warn!(student_id = %student_id, error = %e, "IEP listing fetch failed");
                    results[index] = Err(LoaderError::Backend(e));
                }
            }
        }

        Ok(results)
    }
}

/// Per-request loader for a learner's IEP listing.
///
/// A listing always exists (possibly empty), so `load` resolves to
/// `Some(vec)` for any known learner key.
#[derive(Clone)]
pub struct StudentIepsLoader {
    batcher: Batcher<StudentIepsFetch>,
}

impl StudentIepsLoader {
    /// Creates a loader for one request.
    #[must_use]
    pub fn new(ieps: DynIepApi, cache: Arc<TieredCache>, token: String, delay: Duration) -> Self {
        Self {
            batcher: Batcher::new(StudentIepsFetch { ieps, cache, token }, delay),
        }
    }

    /// Loads every IEP belonging to one learner.
    pub async fn load(&self, student_id: impl Into<String>) -> LoadResult<Vec<Iep>> {
        self.batcher.load(student_id.into()).await
    }

    /// Drops one learner from the request-scoped memo.
    pub async fn clear(&self, student_id: &str) {
        self.batcher.clear(&student_id.to_string()).await;
    }

    /// Drops the whole request-scoped memo.
    pub async fn clear_all(&self) {
        self.batcher.clear_all().await;
    }

    /// Forces the open window to dispatch.
    pub async fn flush(&self) {
        self.batcher.flush().await;
    }

    pub(crate) fn cancel(&self) {
        self.batcher.cancel();
    }
}
