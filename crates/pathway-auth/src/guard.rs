//! The per-field access guard.
//!
//! Each resolver declares a [`FieldPolicy`] — the required role set and
//! whether the field is tenant-scoped. That declaration is the only input
//! the guard needs. The guard runs before any loader or cache call, and
//! re-validates tenant ownership on every value a loader returns: the
//! tiered cache holds entities from all tenants, so the input-argument
//! check alone is not sufficient.

use std::sync::Arc;

use pathway_core::TenantScoped;

use crate::claims::Role;
use crate::context::AuthContext;
use crate::error::AuthError;
use crate::token::TokenVerifier;

/// Authorization requirements declared by one resolver.
#[derive(Debug, Clone, Copy)]
pub struct FieldPolicy {
    /// Roles allowed to execute the resolver. Empty means any
    /// authenticated caller.
    pub required_roles: &'static [Role],
    /// Whether the resolver reads or writes tenant-scoped data.
    pub tenant_scoped: bool,
}

impl FieldPolicy {
    /// A policy restricted to the given roles over tenant-scoped data.
    #[must_use]
    pub const fn roles(required_roles: &'static [Role]) -> Self {
        Self {
            required_roles,
            tenant_scoped: true,
        }
    }

    /// A policy any authenticated caller satisfies.
    #[must_use]
    pub const fn authenticated() -> Self {
        Self {
            required_roles: &[],
            tenant_scoped: false,
        }
    }
}

/// Guards resolver execution with role and tenant checks.
#[derive(Clone)]
pub struct AccessGuard {
    verifier: Arc<TokenVerifier>,
}

impl AccessGuard {
    /// Creates a guard backed by the given token verifier.
    #[must_use]
    pub fn new(verifier: Arc<TokenVerifier>) -> Self {
        Self { verifier }
    }

    /// `unauthenticated -> authenticated`: verifies the bearer header and
    /// builds the immutable caller identity.
    ///
    /// # Errors
    ///
    /// Returns an authentication error that terminates the request before
    /// any resolver runs.
    pub fn authenticate(&self, authorization: Option<&str>) -> Result<AuthContext, AuthError> {
        let claims = self.verifier.verify_bearer(authorization)?;
        let ctx = AuthContext::from_claims(&claims);

        tracing::debug!(
            user_id = %ctx.user_id,
            role = %ctx.role,
            tenant_id = %ctx.tenant_id,
            "Caller authenticated"
        );

        Ok(ctx)
    }

    /// `authenticated -> authorized | denied`: checks the caller's role
    /// against the field's policy.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] when the caller's role is not in
    /// the required set.
    pub fn authorize(&self, ctx: &AuthContext, policy: &FieldPolicy) -> Result<(), AuthError> {
        if policy.required_roles.is_empty() || policy.required_roles.contains(&ctx.role) {
            return Ok(());
        }

        tracing::debug!(
            user_id = %ctx.user_id,
            role = %ctx.role,
            "Role not permitted for field"
        );
        Err(AuthError::Forbidden)
    }

    /// Rejects cross-tenant access on a tenant-scoped argument.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] when the tenants differ, with no
    /// detail that would reveal whether the target exists.
    pub fn check_tenant(&self, ctx: &AuthContext, tenant_id: &str) -> Result<(), AuthError> {
        if ctx.tenant_id == tenant_id {
            return Ok(());
        }

        tracing::warn!(
            user_id = %ctx.user_id,
            caller_tenant = %ctx.tenant_id,
            "Cross-tenant access denied"
        );
        Err(AuthError::Forbidden)
    }

    /// Re-validates a loaded entity against the field's policy.
    ///
    /// Applied at the point of return for every loader result. When the
    /// policy is tenant-scoped, the entity's owning tenant must match the
    /// caller's: the cache and the batch loader operate across tenants,
    /// so a value can belong to a tenant other than the one named in the
    /// request arguments. The check is driven by the policy declaration,
    /// not by the resolver remembering to make it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] when the caller's role is not in
    /// the required set, or when the policy is tenant-scoped and the
    /// entity belongs to another tenant.
    pub fn authorize_entity<T: TenantScoped>(
        &self,
        ctx: &AuthContext,
        policy: &FieldPolicy,
        entity: &T,
    ) -> Result<(), AuthError> {
        self.authorize(ctx, policy)?;
        if policy.tenant_scoped {
            self.check_tenant(ctx, entity.tenant_id())?;
        }
        Ok(())
    }
}
