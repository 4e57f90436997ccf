//! Guarded query and mutation operations.
//!
//! These are the resolver bodies the external schema engine binds to its
//! fields. Every operation follows the same shape: authorize against the
//! field's declared policy, fetch through the per-request loaders (or a
//! backend client for mutations), re-validate tenant ownership on the
//! loaded value, and — for mutations — complete cache invalidation before
//! returning.
//!
//! Mutations deliberately answer "insufficient permissions" both for
//! cross-tenant targets and for ids that do not exist: distinguishing the
//! two would tell a denied caller whether the entity exists.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use pathway_auth::{AuthError, FieldPolicy, Role};
use pathway_cache::{QueryScope, RelatedIds, keys};
use pathway_clients::IepPatch;
use pathway_core::{EngagementReport, EntityType, Iep, Student, TenantSettings};

use crate::context::GatewayContext;
use crate::error::GatewayError;

/// Read access to learner data: all staff roles plus guardians.
pub const READ_POLICY: FieldPolicy =
    FieldPolicy::roles(&[Role::Admin, Role::Teacher, Role::Provider, Role::Guardian]);

/// Staff-only read access (analytics).
pub const STAFF_READ_POLICY: FieldPolicy =
    FieldPolicy::roles(&[Role::Admin, Role::Teacher, Role::Provider]);

/// IEP mutation access.
pub const MUTATE_IEP_POLICY: FieldPolicy = FieldPolicy::roles(&[Role::Admin, Role::Teacher]);

/// Tenant administration access.
pub const ADMIN_POLICY: FieldPolicy = FieldPolicy::roles(&[Role::Admin]);

// =============================================================================
// Queries
// =============================================================================

/// Resolves one learner by id.
pub async fn student(
    ctx: &GatewayContext,
    id: &str,
) -> Result<Option<Student>, GatewayError> {
    ctx.guard.authorize(&ctx.auth, &READ_POLICY)?;

    let Some(student) = ctx.loaders.students.load(id).await? else {
        return Ok(None);
    };
    ctx.guard.authorize_entity(&ctx.auth, &READ_POLICY, &student)?;
    Ok(Some(student))
}

/// Resolves one IEP document by id.
pub async fn iep(ctx: &GatewayContext, id: &str) -> Result<Option<Iep>, GatewayError> {
    ctx.guard.authorize(&ctx.auth, &READ_POLICY)?;

    let Some(iep) = ctx.loaders.ieps.load(id).await? else {
        return Ok(None);
    };
    ctx.guard.authorize_entity(&ctx.auth, &READ_POLICY, &iep)?;
    Ok(Some(iep))
}

/// Resolves every IEP belonging to one learner.
pub async fn student_ieps(
    ctx: &GatewayContext,
    student_id: &str,
) -> Result<Vec<Iep>, GatewayError> {
    ctx.guard.authorize(&ctx.auth, &READ_POLICY)?;

    let listing = ctx
        .loaders
        .student_ieps
        .load(student_id)
        .await?
        .unwrap_or_default();

    // The listing key is not tenant-discriminated; check every document.
    for iep in &listing {
        ctx.guard.authorize_entity(&ctx.auth, &READ_POLICY, iep)?;
    }
    Ok(listing)
}

/// Resolves the latest engagement report for one learner.
pub async fn engagement_report(
    ctx: &GatewayContext,
    student_id: &str,
) -> Result<Option<EngagementReport>, GatewayError> {
    ctx.guard.authorize(&ctx.auth, &STAFF_READ_POLICY)?;

    let variables = serde_json::json!({ "student_id": student_id });
    let report: Option<EngagementReport> = cached_query(
        ctx,
        "engagement_report",
        &variables,
        QueryScope::Shared,
        None,
        || async {
            ctx.registry
                .analytics
                .engagement_report(student_id, &ctx.token)
                .await
                .map_err(GatewayError::from)
        },
    )
    .await?;

    if let Some(report) = &report {
        ctx.guard.authorize_entity(&ctx.auth, &STAFF_READ_POLICY, report)?;
    }
    Ok(report)
}

/// Resolves the caller's tenant settings.
pub async fn tenant_settings(
    ctx: &GatewayContext,
) -> Result<Option<TenantSettings>, GatewayError> {
    ctx.guard.authorize(&ctx.auth, &ADMIN_POLICY)?;

    let cache_key = keys::entity_key(EntityType::TenantSettings, &ctx.auth.tenant_id);
    if let Some(settings) = ctx.cache.get::<TenantSettings>(&cache_key).await {
        ctx.guard.authorize_entity(&ctx.auth, &ADMIN_POLICY, &settings)?;
        return Ok(Some(settings));
    }

    let settings = ctx
        .registry
        .admin
        .tenant_settings(&ctx.auth.tenant_id, &ctx.token)
        .await?;

    if let Some(settings) = &settings {
        ctx.guard.authorize_entity(&ctx.auth, &ADMIN_POLICY, settings)?;
        ctx.cache.set(&cache_key, settings, None).await;
    }
    Ok(settings)
}

/// Wraps an arbitrary read in the query-result cache family.
///
/// The key is derived from the query text, the canonicalized variables,
/// and the scope, so identical requests always hit the same entry. Cache
/// failures degrade to running `run`.
pub async fn cached_query<T, F, Fut>(
    ctx: &GatewayContext,
    query: &str,
    variables: &Value,
    scope: QueryScope,
    ttl: Option<Duration>,
    run: F,
) -> Result<T, GatewayError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let cache_key = keys::query_result_key(query, variables, &scope);

    if let Some(hit) = ctx.cache.get::<T>(&cache_key).await {
        tracing::debug!(key = %cache_key, "Query-result cache hit");
        return Ok(hit);
    }

    let value = run().await?;
    ctx.cache.set(&cache_key, &value, ttl).await;
    Ok(value)
}

// =============================================================================
// Mutations
// =============================================================================

/// Applies a patch to an IEP document.
///
/// The response comes from the authoritative backend call, never from
/// cache. Invalidation of the document key and its learner's listing key
/// completes before this function returns, so the mutating caller cannot
/// read its own stale data.
pub async fn update_iep(
    ctx: &GatewayContext,
    id: &str,
    patch: &IepPatch,
) -> Result<Iep, GatewayError> {
    ctx.guard.authorize(&ctx.auth, &MUTATE_IEP_POLICY)?;

    let current = fetch_owned_iep(ctx, id).await?;
    let updated = ctx.registry.ieps.update_iep(id, patch, &ctx.token).await?;

    finish_iep_mutation(ctx, id, &current.student_id).await;
    Ok(updated)
}

/// Deletes an IEP document.
pub async fn delete_iep(ctx: &GatewayContext, id: &str) -> Result<(), GatewayError> {
    ctx.guard.authorize(&ctx.auth, &MUTATE_IEP_POLICY)?;

    let current = fetch_owned_iep(ctx, id).await?;
    ctx.registry.ieps.delete_iep(id, &ctx.token).await?;

    finish_iep_mutation(ctx, id, &current.student_id).await;
    Ok(())
}

/// Loads the mutation target and verifies the caller's tenant owns it.
///
/// Absent and cross-tenant targets are indistinguishable to the caller.
async fn fetch_owned_iep(ctx: &GatewayContext, id: &str) -> Result<Iep, GatewayError> {
    let current = ctx
        .registry
        .ieps
        .get_iep(id, &ctx.token)
        .await?
        .ok_or(GatewayError::Auth(AuthError::Forbidden))?;

    ctx.guard.authorize_entity(&ctx.auth, &MUTATE_IEP_POLICY, &current)?;
    Ok(current)
}

/// Invalidation and memo cleanup shared by the IEP mutations.
async fn finish_iep_mutation(ctx: &GatewayContext, id: &str, student_id: &str) {
    let related = RelatedIds::none().with_student(student_id);
    if let Err(e) = ctx
        .invalidator
        .invalidate(EntityType::Iep, id, &related)
        .await
    {
        // The backend mutation already succeeded; a surviving stale entry
        // is a correctness bug, not a transient nuisance.
        tracing::error!(
            request_id = %ctx.request_id,
            iep_id = %id,
            error = %e,
            "IEP mutation succeeded but cache invalidation failed"
        );
    }

    // The request-scoped memos would otherwise serve the pre-mutation
    // value for the rest of this request.
    ctx.loaders.ieps.clear(id).await;
    ctx.loaders.student_ieps.clear(student_id).await;
}
