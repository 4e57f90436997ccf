//! Cache invalidation on writes.
//!
//! [`InvalidationCoordinator`] owns the static rule table mapping each
//! mutable entity type to the cache keys that depend on it. After a
//! successful mutation the gateway calls [`InvalidationCoordinator::invalidate`]
//! and waits for it before acknowledging the mutation, so the mutating
//! caller can never read its own stale data. Concurrent readers on other
//! gateway instances may still see the old value until deletion lands.

use std::sync::Arc;

use pathway_core::EntityType;

use crate::error::CacheError;
use crate::keys;
use crate::tiered::TieredCache;

/// Related entity ids a mutation supplies so aggregate keys can be
/// invalidated alongside the direct one.
#[derive(Debug, Clone, Default)]
pub struct RelatedIds {
    /// Owning learner, for `student_ieps:{id}` listings.
    pub student_id: Option<String>,
    /// Owning tenant, for `tenant_students:{id}` listings.
    pub tenant_id: Option<String>,
}

impl RelatedIds {
    /// No related entities.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Names the owning learner.
    #[must_use]
    pub fn with_student(mut self, student_id: impl Into<String>) -> Self {
        self.student_id = Some(student_id.into());
        self
    }

    /// Names the owning tenant.
    #[must_use]
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}

/// Deletes the cache keys a mutation has made stale.
#[derive(Clone)]
pub struct InvalidationCoordinator {
    cache: Arc<TieredCache>,
}

impl InvalidationCoordinator {
    /// Creates a coordinator over the shared cache.
    #[must_use]
    pub fn new(cache: Arc<TieredCache>) -> Self {
        Self { cache }
    }

    /// The static rule table: every key the given mutation invalidates.
    ///
    /// Aggregate keys are only produced when the caller supplies the
    /// related id they are parameterized by.
    #[must_use]
    pub fn keys_for(entity_type: EntityType, id: &str, related: &RelatedIds) -> Vec<String> {
        match entity_type {
            EntityType::Iep => {
                let mut cache_keys = vec![keys::entity_key(entity_type, id)];
                if let Some(student_id) = &related.student_id {
                    cache_keys.push(keys::student_ieps_key(student_id));
                }
                cache_keys
            }
            EntityType::Student => {
                let mut cache_keys = vec![keys::entity_key(entity_type, id)];
                if let Some(tenant_id) = &related.tenant_id {
                    cache_keys.push(keys::tenant_students_key(tenant_id));
                }
                cache_keys
            }
            EntityType::TenantSettings => vec![keys::entity_key(entity_type, id)],
            // Engagement reports live only in the TTL-bound query-result
            // family (`qr:`); no entity key is ever written for them, so
            // there is nothing to delete.
            EntityType::Report => Vec::new(),
        }
    }

    /// Deletes every key the rule table produces for this mutation.
    ///
    /// Must complete before the mutation is acknowledged. The mutation's
    /// response value is unaffected either way (it comes from the
    /// authoritative backend call), but a failure here means a stale entry
    /// may survive, which is a correctness bug — callers log it loudly.
    ///
    /// # Errors
    ///
    /// Returns the first deletion failure encountered, after attempting
    /// every key.
    pub async fn invalidate(
        &self,
        entity_type: EntityType,
        id: &str,
        related: &RelatedIds,
    ) -> Result<(), CacheError> {
        let cache_keys = Self::keys_for(entity_type, id, related);
        tracing::debug!(
            entity_type = %entity_type,
            id = %id,
            key_count = cache_keys.len(),
            "Invalidating cache keys"
        );

        let mut first_failure: Option<CacheError> = None;
        for key in &cache_keys {
            if let Err(e) = self.cache.del(key).await {
                tracing::error!(
                    key = %key,
                    error = %e,
                    "Cache invalidation failed; a stale entry may survive"
                );
                first_failure.get_or_insert(e);
            }
        }

        match first_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Tenant-wide invalidation, scoped by key prefix.
    ///
    /// Deletes the tenant's aggregate and settings keys without touching
    /// other tenants' data. The destructive full flush remains available
    /// as [`TieredCache::flush`] for operational emergencies only.
    ///
    /// # Errors
    ///
    /// Returns the first deletion failure encountered.
    pub async fn invalidate_tenant(&self, tenant_id: &str) -> Result<u64, CacheError> {
        let mut deleted = 0;
        for prefix in keys::tenant_prefixes(tenant_id) {
            deleted += self.cache.del_prefix(&prefix).await.map_err(|e| {
                tracing::error!(
                    tenant_id = %tenant_id,
                    prefix = %prefix,
                    error = %e,
                    "Tenant-wide invalidation failed"
                );
                e
            })?;
        }

        tracing::info!(tenant_id = %tenant_id, deleted, "Tenant cache invalidated");
        Ok(deleted)
    }
}
