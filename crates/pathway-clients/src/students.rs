//! Learner-record service client.

use std::sync::Arc;

use async_trait::async_trait;
use pathway_core::Student;

use crate::error::ClientError;
use crate::http::HttpCore;

/// Seam trait for the learner-record service.
#[async_trait]
pub trait StudentApi: Send + Sync {
    /// Fetches one learner; `None` when the id does not exist.
    async fn get_student(&self, id: &str, token: &str) -> Result<Option<Student>, ClientError>;

    /// Fetches many learners in one call.
    ///
    /// The result has exactly one slot per requested id, in request order,
    /// with `None` for ids that do not exist.
    async fn get_students(
        &self,
        ids: &[String],
        token: &str,
    ) -> Result<Vec<Option<Student>>, ClientError>;

    /// Lists every learner of one tenant.
    async fn list_students(&self, tenant_id: &str, token: &str)
    -> Result<Vec<Student>, ClientError>;
}

/// Shared reference to a learner-record API implementation.
pub type DynStudentApi = Arc<dyn StudentApi>;

/// HTTP implementation of [`StudentApi`].
#[derive(Clone)]
pub struct StudentServiceClient {
    http: HttpCore,
}

impl StudentServiceClient {
    /// Service name used in errors and logs.
    pub const SERVICE: &'static str = "learner-record";

    /// Creates a client over the shared transport.
    #[must_use]
    pub fn new(http: HttpCore) -> Self {
        Self { http }
    }
}

#[async_trait]
impl StudentApi for StudentServiceClient {
    async fn get_student(&self, id: &str, token: &str) -> Result<Option<Student>, ClientError> {
        self.http
            .get_json_opt(&format!("students/{id}"), &[], token)
            .await
    }

    async fn get_students(
        &self,
        ids: &[String],
        token: &str,
    ) -> Result<Vec<Option<Student>>, ClientError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let joined = ids.join(",");
        let students: Vec<Option<Student>> = self
            .http
            .get_json("students", &[("ids", joined.as_str())], token)
            .await?;

        tracing::debug!(
            requested = ids.len(),
            found = students.iter().filter(|s| s.is_some()).count(),
            "Learner batch fetched"
        );
        Ok(students)
    }

    async fn list_students(
        &self,
        tenant_id: &str,
        token: &str,
    ) -> Result<Vec<Student>, ClientError> {
        self.http
            .get_json("students", &[("tenant_id", tenant_id)], token)
            .await
    }
}
