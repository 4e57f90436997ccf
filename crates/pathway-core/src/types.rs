//! Entity structs exchanged with the backend services.
//!
//! These mirror the JSON bodies of the learner-record, IEP-document,
//! analytics, and admin-portal services. Every tenant-scoped entity carries
//! its `tenant_id` so the authorization guard can re-validate ownership on
//! values coming back out of the cache, not only on request arguments.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Implemented by every entity that belongs to exactly one tenant.
///
/// The authorization guard re-validates loaded values through this trait
/// before they are returned to a resolver.
pub trait TenantScoped {
    /// The id of the tenant that owns this entity.
    fn tenant_id(&self) -> &str;
}

macro_rules! impl_tenant_scoped {
    ($($ty:ty),+ $(,)?) => {
        $(impl TenantScoped for $ty {
            fn tenant_id(&self) -> &str {
                &self.tenant_id
            }
        })+
    };
}

/// A learner record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    /// Learner-record service id.
    pub id: String,
    /// Owning tenant (school district / organization).
    pub tenant_id: String,
    pub first_name: String,
    pub last_name: String,
    /// Grade level, e.g. "K", "5", "12".
    pub grade_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Student {
    /// Returns the learner's display name.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Lifecycle status of an IEP document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IepStatus {
    Draft,
    Active,
    UnderReview,
    Archived,
}

/// An individualized-education-plan document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iep {
    /// IEP-document service id.
    pub id: String,
    /// Owning tenant.
    pub tenant_id: String,
    /// The learner this plan belongs to.
    pub student_id: String,
    pub status: IepStatus,
    pub title: String,
    /// Goal definitions; opaque to the gateway.
    #[serde(default)]
    pub goals: Vec<serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Aggregated engagement metrics for one learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementReport {
    /// Report id (analytics service).
    pub id: String,
    pub tenant_id: String,
    pub student_id: String,
    /// Metric name -> value; schema owned by the analytics service.
    pub metrics: serde_json::Map<String, serde_json::Value>,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

/// Tenant-level configuration from the admin portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantSettings {
    pub tenant_id: String,
    pub display_name: String,
    /// Feature toggles keyed by feature name.
    #[serde(default)]
    pub features: serde_json::Map<String, serde_json::Value>,
}

impl_tenant_scoped!(Student, Iep, EngagementReport, TenantSettings);
