//! Admin-portal service client.

use std::sync::Arc;

use async_trait::async_trait;
use pathway_core::TenantSettings;

use crate::error::ClientError;
use crate::http::HttpCore;

/// Seam trait for the admin-portal service.
#[async_trait]
pub trait AdminApi: Send + Sync {
    /// Settings for one tenant; `None` when the tenant is unknown.
    async fn tenant_settings(
        &self,
        tenant_id: &str,
        token: &str,
    ) -> Result<Option<TenantSettings>, ClientError>;
}

/// Shared reference to an admin API implementation.
pub type DynAdminApi = Arc<dyn AdminApi>;

/// HTTP implementation of [`AdminApi`].
#[derive(Clone)]
pub struct AdminPortalClient {
    http: HttpCore,
}

impl AdminPortalClient {
    /// Service name used in errors and logs.
    pub const SERVICE: &'static str = "admin-portal";

    /// Creates a client over the shared transport.
    #[must_use]
    pub fn new(http: HttpCore) -> Self {
        Self { http }
    }
}

#[async_trait]
impl AdminApi for AdminPortalClient {
    async fn tenant_settings(
        &self,
        tenant_id: &str,
        token: &str,
    ) -> Result<Option<TenantSettings>, ClientError> {
        self.http
            .get_json_opt(&format!("tenants/{tenant_id}/settings"), &[], token)
            .await
    }
}
