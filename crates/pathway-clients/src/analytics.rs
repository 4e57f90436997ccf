//! Analytics service client.

use std::sync::Arc;

use async_trait::async_trait;
use pathway_core::EngagementReport;

use crate::error::ClientError;
use crate::http::HttpCore;

/// Seam trait for the analytics service.
#[async_trait]
pub trait AnalyticsApi: Send + Sync {
    /// The latest engagement report for one learner, if any exists.
    async fn engagement_report(
        &self,
        student_id: &str,
        token: &str,
    ) -> Result<Option<EngagementReport>, ClientError>;
}

/// Shared reference to an analytics API implementation.
pub type DynAnalyticsApi = Arc<dyn AnalyticsApi>;

/// HTTP implementation of [`AnalyticsApi`].
#[derive(Clone)]
pub struct AnalyticsServiceClient {
    http: HttpCore,
}

impl AnalyticsServiceClient {
    /// Service name used in errors and logs.
    pub const SERVICE: &'static str = "analytics";

    /// Creates a client over the shared transport.
    #[must_use]
    pub fn new(http: HttpCore) -> Self {
        Self { http }
    }
}

#[async_trait]
impl AnalyticsApi for AnalyticsServiceClient {
    async fn engagement_report(
        &self,
        student_id: &str,
        token: &str,
    ) -> Result<Option<EngagementReport>, ClientError> {
        self.http
            .get_json_opt(&format!("reports/engagement/{student_id}"), &[], token)
            .await
    }
}
