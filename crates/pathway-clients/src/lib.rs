//! Typed backend service clients.
//!
//! One stateless client per backend service, all sharing the reqwest
//! plumbing in [`http::HttpCore`]: the learner-record service, the
//! IEP-document service, the analytics service, and the admin-portal
//! service. Each exposes a seam trait (`StudentApi`, `IepApi`, ...) so the
//! loader layer and tests can substitute doubles, mirroring the
//! `Arc<dyn Trait>` storage seam the rest of the platform uses.
//!
//! Non-2xx responses become typed [`ClientError`]s and are never treated
//! as cache-worthy values. Every call takes the caller's bearer token so
//! backend services see the original identity.

pub mod admin;
pub mod analytics;
pub mod error;
pub mod http;
pub mod ieps;
pub mod registry;
pub mod students;

pub use admin::{AdminApi, AdminPortalClient, DynAdminApi};
pub use analytics::{AnalyticsApi, AnalyticsServiceClient, DynAnalyticsApi};
pub use error::ClientError;
pub use ieps::{DynIepApi, IepApi, IepPatch, IepServiceClient};
pub use registry::{ClientRegistry, ServiceEndpoints};
pub use students::{DynStudentApi, StudentApi, StudentServiceClient};
