//! Entity type identifiers.
//!
//! [`EntityType`] names every kind of entity the gateway caches. The string
//! form is stable: it is embedded in cache keys and in the invalidation
//! rule table, so renaming a variant's string is a breaking change for any
//! deployed cache.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The kinds of entities served through the gateway's data-access layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A learner record from the learner-record service.
    Student,
    /// An individualized-education-plan document.
    Iep,
    /// An engagement report from the analytics service.
    Report,
    /// Tenant-level settings from the admin-portal service.
    TenantSettings,
}

impl EntityType {
    /// Returns the stable string form used in cache keys.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Iep => "iep",
            Self::Report => "report",
            Self::TenantSettings => "tenant_settings",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
