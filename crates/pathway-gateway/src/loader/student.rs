//! Learner loader: batches "student by id" through the tiered cache.

use std::sync::Arc;

use async_trait::async_trait;
use pathway_cache::{TieredCache, keys};
use pathway_clients::DynStudentApi;
use pathway_core::{EntityType, Student};
use tracing::instrument;

use super::batch::{BatchFetch, Batcher, LoadResult, LoaderError};

/// Batch function for learners: cache multi-get, one backend batch call
/// for the misses, write-back of everything fetched.
pub struct StudentFetch {
    students: DynStudentApi,
    cache: Arc<TieredCache>,
    token: String,
}

#[async_trait]
impl BatchFetch for StudentFetch {
    type Key = String;
    type Value = Student;

    #[instrument(skip(self, ids), fields(key_count = ids.len()))]
    async fn fetch(
        &self,
        ids: &[String],
    ) -> Result<Vec<Result<Option<Student>, LoaderError>>, LoaderError> {
        let cache_keys: Vec<String> = ids
            .iter()
            .map(|id| keys::entity_key(EntityType::Student, id))
            .collect();
        let cached: Vec<Option<Student>> = self.cache.mget(&cache_keys).await;

        let missing: Vec<(usize, String)> = cached
            .iter()
            .enumerate()
            .filter(|(_, hit)| hit.is_none())
            .map(|(index, _)| (index, ids[index].clone()))
            .collect();

        let mut results: Vec<Result<Option<Student>, LoaderError>> =
            cached.into_iter().map(Ok).collect();

        if missing.is_empty() {
            return Ok(results);
        }

        let missing_ids: Vec<String> = missing.iter().map(|(_, id)| id.clone()).collect();
        match self.students.get_students(&missing_ids, &self.token).await {
            Ok(fetched) if fetched.len() == missing.len() => {
                let mut write_back: Vec<(String, Student)> = Vec::new();
                for ((index, id), student) in missing.into_iter().zip(fetched) {
                    if let Some(student) = &student {
                        write_back
                            .push((keys::entity_key(EntityType::Student, id.as_str()), student.clone()));
                    }
                    results[index] = Ok(student);
                }
                if !write_back.is_empty() {
                    self.cache.mset(&write_back, None).await;
                }
            }
            Ok(fetched) => {
                // Service broke its batch contract; reject only the keys
                // that depended on it.
                tracing::error!(
                    requested = missing.len(),
                    returned = fetched.len(),
                    "Learner batch endpoint returned mismatched result count"
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
                tracing::warn!(error = %e, "Learner batch fetch failed");
                for (index, _) in missing {
                    results[index] = Err(LoaderError::Backend(e.clone()));
                }
            }
        }

        tracing::debug!(
            requested = ids.len(),
            found = results
                .iter()
                .filter(|r| matches!(r, Ok(Some(_))))
                .count(),
            "Learner batch load complete"
        );
        Ok(results)
    }
}

/// Per-request learner loader.
#[derive(Clone)]
pub struct StudentLoader {
    batcher: Batcher<StudentFetch>,
}

impl StudentLoader {
    /// Creates a loader for one request.
    #[must_use]
    pub fn new(
        students: DynStudentApi,
        cache: Arc<TieredCache>,
        token: String,
        delay: std::time::Duration,
    ) -> Self {
        Self {
            batcher: Batcher::new(
                StudentFetch {
                    students,
                    cache,
                    token,
                },
                delay,
            ),
        }
    }

    /// Loads one learner by id.
    pub async fn load(&self, id: impl Into<String>) -> LoadResult<Student> {
        self.batcher.load(id.into()).await
    }

    /// Loads many learners; results match input order.
    pub async fn load_many(&self, ids: Vec<String>) -> Vec<LoadResult<Student>> {
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
