//! Per-request caller identity.

use crate::claims::{AccessClaims, Role};

/// The verified caller identity attached to one request.
///
/// Built once from verified claims, immutable for the request's lifetime,
/// and never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthContext {
    /// Subject id of the caller.
    pub user_id: String,
    /// Caller email.
    pub email: String,
    /// Caller role.
    pub role: Role,
    /// The tenant the caller belongs to.
    pub tenant_id: String,
    /// Granted scopes.
    pub scopes: Vec<String>,
}

impl AuthContext {
    /// Builds the context from verified claims.
    #[must_use]
    pub fn from_claims(claims: &AccessClaims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            email: claims.email.clone(),
            role: claims.role,
            tenant_id: claims.tenant_id.clone(),
            scopes: claims.scopes(),
        }
    }

    /// Returns `true` if the caller was granted the given scope.
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}
