//! IEP-document service client.

use std::sync::Arc;

use async_trait::async_trait;
use pathway_core::{Iep, IepStatus};
use serde::Serialize;

use crate::error::ClientError;
use crate::http::HttpCore;

/// Fields an IEP mutation may change. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IepPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IepStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goals: Option<Vec<serde_json::Value>>,
}

/// Seam trait for the IEP-document service.
#[async_trait]
pub trait IepApi: Send + Sync {
    /// Fetches one IEP; `None` when the id does not exist.
    async fn get_iep(&self, id: &str, token: &str) -> Result<Option<Iep>, ClientError>;

    /// Fetches many IEPs; one slot per id, request order, `None` for
    /// missing ids.
    async fn get_ieps(&self, ids: &[String], token: &str)
    -> Result<Vec<Option<Iep>>, ClientError>;

    /// All IEPs belonging to one learner.
    async fn ieps_for_student(
        &self,
        student_id: &str,
        token: &str,
    ) -> Result<Vec<Iep>, ClientError>;

    /// Applies a patch and returns the updated document.
    async fn update_iep(&self, id: &str, patch: &IepPatch, token: &str)
    -> Result<Iep, ClientError>;

    /// Deletes an IEP document.
    async fn delete_iep(&self, id: &str, token: &str) -> Result<(), ClientError>;
}

/// Shared reference to an IEP API implementation.
pub type DynIepApi = Arc<dyn IepApi>;

/// HTTP implementation of [`IepApi`].
#[derive(Clone)]
pub struct IepServiceClient {
    http: HttpCore,
}

impl IepServiceClient {
    /// Service name used in errors and logs.
    pub const SERVICE: &'static str = "iep-document";

    /// Creates a client over the shared transport.
    #[must_use]
    pub fn new(http: HttpCore) -> Self {
        Self { http }
    }
}

#[async_trait]
impl IepApi for IepServiceClient {
    async fn get_iep(&self, id: &str, token: &str) -> Result<Option<Iep>, ClientError> {
        self.http.get_json_opt(&format!("ieps/{id}"), &[], token).await
    }

    async fn get_ieps(
        &self,
        ids: &[String],
        token: &str,
    ) -> Result<Vec<Option<Iep>>, ClientError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let joined = ids.join(",");
        self.http
            .get_json("ieps", &[("ids", joined.as_str())], token)
            .await
    }

    async fn ieps_for_student(
        &self,
        student_id: &str,
        token: &str,
    ) -> Result<Vec<Iep>, ClientError> {
        self.http
            .get_json("ieps", &[("student_id", student_id)], token)
            .await
    }

    async fn update_iep(
        &self,
        id: &str,
        patch: &IepPatch,
        token: &str,
    ) -> Result<Iep, ClientError> {
        self.http.put_json(&format!("ieps/{id}"), patch, token).await
    }

    async fn delete_iep(&self, id: &str, token: &str) -> Result<(), ClientError> {
        self.http.delete(&format!("ieps/{id}"), token).await
    }
}
