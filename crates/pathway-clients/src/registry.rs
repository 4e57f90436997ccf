//! The backend client registry.
//!
//! Built once at process start and passed by reference into each request's
//! context: explicit dependency injection in place of hidden global state.
//! All clients share one reqwest connection pool.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::admin::{AdminPortalClient, DynAdminApi};
use crate::analytics::{AnalyticsServiceClient, DynAnalyticsApi};
use crate::error::ClientError;
use crate::http::HttpCore;
use crate::ieps::{DynIepApi, IepServiceClient};
use crate::students::{DynStudentApi, StudentServiceClient};

/// Base URLs of the four backend services.
#[derive(Debug, Clone)]
pub struct ServiceEndpoints {
    pub learner_record: Url,
    pub iep_document: Url,
    pub analytics: Url,
    pub admin_portal: Url,
}

/// One client per backend service, constructed once and shared.
#[derive(Clone)]
pub struct ClientRegistry {
    pub students: DynStudentApi,
    pub ieps: DynIepApi,
    pub analytics: DynAnalyticsApi,
    pub admin: DynAdminApi,
}

impl ClientRegistry {
    /// Default per-request timeout for backend calls.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Builds the registry with a shared connection pool.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the HTTP client cannot be constructed.
    pub fn new(endpoints: ServiceEndpoints) -> Result<Self, ClientError> {
        Self::with_timeout(endpoints, Self::DEFAULT_TIMEOUT)
    }

    /// Builds the registry with an explicit backend-call timeout.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the HTTP client cannot be constructed.
    pub fn with_timeout(
        endpoints: ServiceEndpoints,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to build HTTP client");
                ClientError::Transport { service: "gateway" }
            })?;

        Ok(Self {
            students: Arc::new(StudentServiceClient::new(HttpCore::new(
                client.clone(),
                endpoints.learner_record,
                StudentServiceClient::SERVICE,
            ))),
            ieps: Arc::new(IepServiceClient::new(HttpCore::new(
                client.clone(),
                endpoints.iep_document,
                IepServiceClient::SERVICE,
            ))),
            analytics: Arc::new(AnalyticsServiceClient::new(HttpCore::new(
                client.clone(),
                endpoints.analytics,
                AnalyticsServiceClient::SERVICE,
            ))),
            admin: Arc::new(AdminPortalClient::new(HttpCore::new(
                client,
                endpoints.admin_portal,
                AdminPortalClient::SERVICE,
            ))),
        })
    }

    /// Builds a registry from already-constructed implementations.
    ///
    /// Used by tests and by embeddings that stub a subset of services.
    #[must_use]
    pub fn from_parts(
        students: DynStudentApi,
        ieps: DynIepApi,
        analytics: DynAnalyticsApi,
        admin: DynAdminApi,
    ) -> Self {
        Self {
            students,
            ieps,
            analytics,
            admin,
        }
    }
}
