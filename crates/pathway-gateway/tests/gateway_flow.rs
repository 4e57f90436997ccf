//! End-to-end tests of the request flow: guard, loaders, tiered cache,
//! and invalidation working together over stubbed backend services.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::macros::datetime;

use pathway_auth::{AccessGuard, AuthContext, Role, TokenVerifier};
use pathway_cache::{TieredCache, keys};
use pathway_clients::{
    AdminApi, AnalyticsApi, ClientError, ClientRegistry, IepApi, IepPatch, StudentApi,
};
use pathway_core::{EngagementReport, EntityType, Iep, IepStatus, Student, TenantSettings};
use pathway_gateway::{GatewayContext, GatewayError, LoaderError, operations};

// =============================================================================
// Backend doubles
// =============================================================================

struct MockStudents {
    students: HashMap<String, Student>,
    batch_calls: AtomicUsize,
    fail: bool,
}

impl MockStudents {
    fn with(students: Vec<Student>) -> Self {
        Self {
            students: students.into_iter().map(|s| (s.id.clone(), s)).collect(),
            batch_calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            students: HashMap::new(),
            batch_calls: AtomicUsize::new(0),
            fail: true,
        }
    }
}

#[async_trait]
impl StudentApi for MockStudents {
    async fn get_student(&self, id: &str, _token: &str) -> Result<Option<Student>, ClientError> {
        Ok(self.students.get(id).cloned())
    }

    async fn get_students(
        &self,
        ids: &[String],
        _token: &str,
    ) -> Result<Vec<Option<Student>>, ClientError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ClientError::Status {
                service: "learner-record",
                status: 503,
            });
        }
        Ok(ids.iter().map(|id| self.students.get(id).cloned()).collect())
    }

    async fn list_students(
        &self,
        tenant_id: &str,
        _token: &str,
    ) -> Result<Vec<Student>, ClientError> {
        Ok(self
            .students
            .values()
            .filter(|s| s.tenant_id == tenant_id)
            .cloned()
            .collect())
    }
}

/// Learner service double that drops the last element of every batch
/// reply, breaking the positional contract.
struct TruncatingStudents;

#[async_trait]
impl StudentApi for TruncatingStudents {
    async fn get_student(&self, _id: &str, _token: &str) -> Result<Option<Student>, ClientError> {
        Ok(None)
    }

    async fn get_students(
        &self,
        ids: &[String],
        _token: &str,
    ) -> Result<Vec<Option<Student>>, ClientError> {
        Ok(ids[..ids.len() - 1].iter().map(|_| None).collect())
    }

    async fn list_students(
        &self,
        _tenant_id: &str,
        _token: &str,
    ) -> Result<Vec<Student>, ClientError> {
        Ok(vec![])
    }
}

struct MockIeps {
    ieps: Mutex<HashMap<String, Iep>>,
    batch_calls: AtomicUsize,
}

impl MockIeps {
    fn with(ieps: Vec<Iep>) -> Self {
        Self {
            ieps: Mutex::new(ieps.into_iter().map(|i| (i.id.clone(), i)).collect()),
            batch_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl IepApi for MockIeps {
    async fn get_iep(&self, id: &str, _token: &str) -> Result<Option<Iep>, ClientError> {
        Ok(self.ieps.lock().unwrap().get(id).cloned())
    }

    async fn get_ieps(
        &self,
        ids: &[String],
        _token: &str,
    ) -> Result<Vec<Option<Iep>>, ClientError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let ieps = self.ieps.lock().unwrap();
        Ok(ids.iter().map(|id| ieps.get(id).cloned()).collect())
    }

    async fn ieps_for_student(
        &self,
        student_id: &str,
        _token: &str,
    ) -> Result<Vec<Iep>, ClientError> {
        Ok(self
            .ieps
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn update_iep(
        &self,
        id: &str,
        patch: &IepPatch,
        _token: &str,
    ) -> Result<Iep, ClientError> {
        let mut ieps = self.ieps.lock().unwrap();
        let iep = ieps.get_mut(id).ok_or(ClientError::NotFound {
            service: "iep-document",
        })?;
        if let Some(title) = &patch.title {
            iep.title = title.clone();
        }
        if let Some(status) = patch.status {
            iep.status = status;
        }
        if let Some(goals) = &patch.goals {
            iep.goals = goals.clone();
        }
        Ok(iep.clone())
    }

    async fn delete_iep(&self, id: &str, _token: &str) -> Result<(), ClientError> {
        self.ieps.lock().unwrap().remove(id);
        Ok(())
    }
}

struct MockAnalytics {
    report: Option<EngagementReport>,
    calls: AtomicUsize,
}

#[async_trait]
impl AnalyticsApi for MockAnalytics {
    async fn engagement_report(
        &self,
        _student_id: &str,
        _token: &str,
    ) -> Result<Option<EngagementReport>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.report.clone())
    }
}

struct MockAdmin {
    settings: Option<TenantSettings>,
}

#[async_trait]
impl AdminApi for MockAdmin {
    async fn tenant_settings(
        &self,
        _tenant_id: &str,
        _token: &str,
    ) -> Result<Option<TenantSettings>, ClientError> {
        Ok(self.settings.clone())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

fn student(id: &str, tenant: &str) -> Student {
    Student {
        id: id.into(),
        tenant_id: tenant.into(),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        grade_level: "7".into(),
        email: None,
    }
}

fn iep(id: &str, tenant: &str, student_id: &str, title: &str) -> Iep {
    Iep {
        id: id.into(),
        tenant_id: tenant.into(),
        student_id: student_id.into(),
        status: IepStatus::Active,
        title: title.into(),
        goals: vec![],
        updated_at: datetime!(2024-09-01 12:00 UTC),
    }
}

struct Harness {
    students: Arc<MockStudents>,
    ieps: Arc<MockIeps>,
    analytics: Arc<MockAnalytics>,
    cache: Arc<TieredCache>,
}

impl Harness {
    fn new(students: MockStudents, ieps: MockIeps) -> Self {
        Self::with_analytics(students, ieps, MockAnalytics {
            report: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn with_analytics(students: MockStudents, ieps: MockIeps, analytics: MockAnalytics) -> Self {
        Self {
            students: Arc::new(students),
            ieps: Arc::new(ieps),
            analytics: Arc::new(analytics),
            cache: Arc::new(TieredCache::local_only()),
        }
    }

    /// Builds a fresh request context, as the transport layer would per
    /// incoming request.
    fn context(&self, role: Role, tenant: &str) -> GatewayContext {
        let verifier = TokenVerifier::from_hmac_secret(
            b"flow-test-secret",
            "https://id.example.org",
            "https://gateway.example.org",
        );
        let auth = AuthContext {
            user_id: "u-1".into(),
            email: "u@example.org".into(),
            role,
            tenant_id: tenant.into(),
            scopes: vec![],
        };
        let registry = ClientRegistry::from_parts(
            self.students.clone(),
            self.ieps.clone(),
            self.analytics.clone(),
            Arc::new(MockAdmin {
                settings: Some(TenantSettings {
                    tenant_id: tenant.into(),
                    display_name: "District One".into(),
                    features: serde_json::Map::new(),
                }),
            }),
        );

        GatewayContext::builder()
            .with_registry(registry)
            .with_cache(self.cache.clone())
            .with_guard(AccessGuard::new(Arc::new(verifier)))
            .with_auth(auth)
            .with_token("bearer-token")
            .with_batch_delay(Duration::from_millis(2))
            .build()
            .unwrap()
    }
}

// =============================================================================
// Batching and memoization
// =============================================================================

#[tokio::test]
async fn test_concurrent_loads_coalesce_into_one_batch() {
    let harness = Harness::new(
        MockStudents::with(vec![
            student("s-1", "t-1"),
            student("s-2", "t-1"),
            student("s-3", "t-1"),
        ]),
        MockIeps::with(vec![]),
    );
    let ctx = harness.context(Role::Teacher, "t-1");

    let (a, b, c) = tokio::join!(
        operations::student(&ctx, "s-1"),
        operations::student(&ctx, "s-2"),
        operations::student(&ctx, "s-3"),
    );

    assert_eq!(a.unwrap().unwrap().id, "s-1");
    assert_eq!(b.unwrap().unwrap().id, "s-2");
    assert_eq!(c.unwrap().unwrap().id, "s-3");
    assert_eq!(harness.students.batch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_repeated_load_is_memoized_within_request() {
    let harness = Harness::new(
        MockStudents::with(vec![student("s-1", "t-1")]),
        MockIeps::with(vec![]),
    );
    let ctx = harness.context(Role::Teacher, "t-1");

    let first = operations::student(&ctx, "s-1").await.unwrap();
    let second = operations::student(&ctx, "s-1").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(harness.students.batch_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_unknown_id_resolves_to_none() {
    let harness = Harness::new(MockStudents::with(vec![]), MockIeps::with(vec![]));
    let ctx = harness.context(Role::Teacher, "t-1");

    assert_eq!(operations::student(&ctx, "s-nope").await.unwrap(), None);
}

#[tokio::test]
async fn test_cache_hit_survives_backend_failure() {
    // Warm the entity cache out of band, then batch a cached key together
    // with an uncached one against a dead backend: the cached key must
    // still resolve.
    let harness = Harness::new(MockStudents::failing(), MockIeps::with(vec![]));
    harness
        .cache
        .set(
            &keys::entity_key(EntityType::Student, "s-a"),
            &student("s-a", "t-1"),
            None,
        )
        .await;

    let ctx = harness.context(Role::Teacher, "t-1");
    let (a, b) = tokio::join!(
        operations::student(&ctx, "s-a"),
        operations::student(&ctx, "s-b"),
    );

    assert_eq!(a.unwrap().unwrap().id, "s-a");
    let err = b.unwrap_err();
    assert!(matches!(err, GatewayError::Backend(_)));
    assert_eq!(err.error_code(), "BACKEND_ERROR");
}

#[tokio::test]
async fn test_truncated_batch_reply_counts_only_dispatched_keys() {
    // One key is served from the warmed cache, so only two reach the
    // backend. Its reply comes back one element short; the mismatch must
    // be reported against the two keys actually dispatched, not the
    // whole window.
    let cache = Arc::new(TieredCache::local_only());
    cache
        .set(
            &keys::entity_key(EntityType::Student, "s-a"),
            &student("s-a", "t-1"),
            None,
        )
        .await;

    let verifier = TokenVerifier::from_hmac_secret(
        b"flow-test-secret",
        "https://id.example.org",
        "https://gateway.example.org",
    );
    let registry = ClientRegistry::from_parts(
        Arc::new(TruncatingStudents),
        Arc::new(MockIeps::with(vec![])),
        Arc::new(MockAnalytics {
            report: None,
            calls: AtomicUsize::new(0),
        }),
        Arc::new(MockAdmin { settings: None }),
    );
    let ctx = GatewayContext::builder()
        .with_registry(registry)
        .with_cache(cache)
        .with_guard(AccessGuard::new(Arc::new(verifier)))
        .with_auth(AuthContext {
            user_id: "u-1".into(),
            email: "u@example.org".into(),
            role: Role::Teacher,
            tenant_id: "t-1".into(),
            scopes: vec![],
        })
        .with_token("bearer-token")
        .with_batch_delay(Duration::from_millis(2))
        .build()
        .unwrap();

    let (a, b, c) = tokio::join!(
        operations::student(&ctx, "s-a"),
        operations::student(&ctx, "s-b"),
        operations::student(&ctx, "s-c"),
    );

    assert_eq!(a.unwrap().unwrap().id, "s-a");
    for result in [b, c] {
        match result.unwrap_err() {
            GatewayError::Loader(e) => assert!(matches!(
                *e,
                LoaderError::ProtocolMismatch {
                    requested: 2,
                    returned: 1
                }
            )),
            other => panic!("expected loader protocol error, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_cancelled_request_refuses_new_loads() {
    let harness = Harness::new(
        MockStudents::with(vec![student("s-1", "t-1")]),
        MockIeps::with(vec![]),
    );
    let ctx = harness.context(Role::Teacher, "t-1");

    ctx.cancel();
    let err = operations::student(&ctx, "s-1").await.unwrap_err();
    assert_eq!(err.error_code(), "REQUEST_CANCELLED");
    assert_eq!(harness.students.batch_calls.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Authorization
// =============================================================================

#[tokio::test]
async fn test_cross_tenant_read_denied_even_for_admin() {
    let harness = Harness::new(
        MockStudents::with(vec![student("s-1", "t-2")]),
        MockIeps::with(vec![]),
    );
    let ctx = harness.context(Role::Admin, "t-1");

    let err = operations::student(&ctx, "s-1").await.unwrap_err();
    assert_eq!(err.error_code(), "FORBIDDEN");
    assert_eq!(err.to_string(), "Insufficient permissions");
}

#[tokio::test]
async fn test_guardian_denied_analytics() {
    let harness = Harness::new(MockStudents::with(vec![]), MockIeps::with(vec![]));
    let ctx = harness.context(Role::Guardian, "t-1");

    let err = operations::engagement_report(&ctx, "s-1").await.unwrap_err();
    assert_eq!(err.error_code(), "FORBIDDEN");
}

#[tokio::test]
async fn test_guardian_denied_iep_mutation() {
    let harness = Harness::new(
        MockStudents::with(vec![]),
        MockIeps::with(vec![iep("iep-1", "t-1", "s-1", "Reading")]),
    );
    let ctx = harness.context(Role::Guardian, "t-1");

    let err = operations::delete_iep(&ctx, "iep-1").await.unwrap_err();
    assert_eq!(err.error_code(), "FORBIDDEN");
    // The target must still exist.
    assert!(
        harness
            .ieps
            .get_iep("iep-1", "")
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test]
async fn test_mutation_hides_existence_from_cross_tenant_caller() {
    let harness = Harness::new(
        MockStudents::with(vec![]),
        MockIeps::with(vec![iep("iep-other", "t-2", "s-9", "Math")]),
    );
    let ctx = harness.context(Role::Admin, "t-1");

    let cross_tenant = operations::update_iep(&ctx, "iep-other", &IepPatch::default())
        .await
        .unwrap_err();
    let missing = operations::update_iep(&ctx, "iep-none", &IepPatch::default())
        .await
        .unwrap_err();

    // Indistinguishable: same code, same message.
    assert_eq!(cross_tenant.error_code(), "FORBIDDEN");
    assert_eq!(missing.error_code(), "FORBIDDEN");
    assert_eq!(cross_tenant.to_string(), missing.to_string());
}

#[tokio::test]
async fn test_student_ieps_rechecks_every_document() {
    // A poisoned cache entry holds another tenant's listing under this
    // learner's key; the per-document re-check must catch it.
    let harness = Harness::new(MockStudents::with(vec![]), MockIeps::with(vec![]));
    harness
        .cache
        .set(
            &keys::student_ieps_key("s-1"),
            &vec![iep("iep-x", "t-2", "s-1", "Leaked")],
            None,
        )
        .await;

    let ctx = harness.context(Role::Teacher, "t-1");
    let err = operations::student_ieps(&ctx, "s-1").await.unwrap_err();
    assert_eq!(err.error_code(), "FORBIDDEN");
}

// =============================================================================
// Mutations and invalidation
// =============================================================================

#[tokio::test]
async fn test_update_invalidates_before_returning() {
    let harness = Harness::new(
        MockStudents::with(vec![]),
        MockIeps::with(vec![iep("iep-1", "t-1", "s-1", "Reading fluency")]),
    );

    // First request warms the cache.
    let read_ctx = harness.context(Role::Teacher, "t-1");
    let before = operations::iep(&read_ctx, "iep-1").await.unwrap().unwrap();
    assert_eq!(before.title, "Reading fluency");

    // Second request mutates.
    let write_ctx = harness.context(Role::Teacher, "t-1");
    let patch = IepPatch {
        title: Some("Reading comprehension".into()),
        ..IepPatch::default()
    };
    let updated = operations::update_iep(&write_ctx, "iep-1", &patch)
        .await
        .unwrap();
    assert_eq!(updated.title, "Reading comprehension");

    // Third request must see the new value, not the warmed entry.
    let after_ctx = harness.context(Role::Teacher, "t-1");
    let after = operations::iep(&after_ctx, "iep-1").await.unwrap().unwrap();
    assert_eq!(after.title, "Reading comprehension");
}

#[tokio::test]
async fn test_mutating_request_does_not_read_its_own_stale_memo() {
    let harness = Harness::new(
        MockStudents::with(vec![]),
        MockIeps::with(vec![iep("iep-1", "t-1", "s-1", "Old title")]),
    );
    let ctx = harness.context(Role::Teacher, "t-1");

    // Read first so both the cache and the request memo hold the old value.
    let before = operations::iep(&ctx, "iep-1").await.unwrap().unwrap();
    assert_eq!(before.title, "Old title");

    let patch = IepPatch {
        title: Some("New title".into()),
        ..IepPatch::default()
    };
    operations::update_iep(&ctx, "iep-1", &patch).await.unwrap();

    let after = operations::iep(&ctx, "iep-1").await.unwrap().unwrap();
    assert_eq!(after.title, "New title");
}

#[tokio::test]
async fn test_delete_invalidates_listing() {
    let harness = Harness::new(
        MockStudents::with(vec![]),
        MockIeps::with(vec![
            iep("iep-1", "t-1", "s-1", "Reading"),
            iep("iep-2", "t-1", "s-1", "Math"),
        ]),
    );

    let read_ctx = harness.context(Role::Teacher, "t-1");
    let before = operations::student_ieps(&read_ctx, "s-1").await.unwrap();
    assert_eq!(before.len(), 2);

    let write_ctx = harness.context(Role::Teacher, "t-1");
    operations::delete_iep(&write_ctx, "iep-1").await.unwrap();

    let after_ctx = harness.context(Role::Teacher, "t-1");
    let after = operations::student_ieps(&after_ctx, "s-1").await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, "iep-2");
}

// =============================================================================
// Query-result caching
// =============================================================================

#[tokio::test]
async fn test_engagement_report_served_from_query_cache() {
    let report = EngagementReport {
        id: "r-1".into(),
        tenant_id: "t-1".into(),
        student_id: "s-1".into(),
        metrics: serde_json::Map::new(),
        generated_at: datetime!(2024-09-01 12:00 UTC),
    };
    let harness = Harness::with_analytics(
        MockStudents::with(vec![]),
        MockIeps::with(vec![]),
        MockAnalytics {
            report: Some(report.clone()),
            calls: AtomicUsize::new(0),
        },
    );

    let first_ctx = harness.context(Role::Teacher, "t-1");
    let first = operations::engagement_report(&first_ctx, "s-1").await.unwrap();
    assert_eq!(first.as_ref(), Some(&report));

    // A second request hits the query-result cache, not the service.
    let second_ctx = harness.context(Role::Teacher, "t-1");
    let second = operations::engagement_report(&second_ctx, "s-1").await.unwrap();
    assert_eq!(second.as_ref(), Some(&report));
    assert_eq!(harness.analytics.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_tenant_settings_admin_only_and_cached() {
    let harness = Harness::new(MockStudents::with(vec![]), MockIeps::with(vec![]));

    let teacher_ctx = harness.context(Role::Teacher, "t-1");
    let err = operations::tenant_settings(&teacher_ctx).await.unwrap_err();
    assert_eq!(err.error_code(), "FORBIDDEN");

    let admin_ctx = harness.context(Role::Admin, "t-1");
    let settings = operations::tenant_settings(&admin_ctx).await.unwrap().unwrap();
    assert_eq!(settings.display_name, "District One");

    // The read-through populated the entity cache.
    let cached: Option<TenantSettings> = harness
        .cache
        .get(&keys::entity_key(EntityType::TenantSettings, "t-1"))
        .await;
    assert!(cached.is_some());
}
