//! Per-request execution context.
//!
//! [`GatewayContext`] holds everything an operation needs: process-wide
//! shared state (client registry, tiered cache, invalidation coordinator,
//! access guard) and request state (the verified caller, the bearer token
//! for propagation, a request id, the per-request loaders, and a
//! cancellation flag). Built through the validating
//! [`GatewayContextBuilder`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use pathway_auth::{AccessGuard, AuthContext};
use pathway_cache::{InvalidationCoordinator, TieredCache};
use pathway_clients::ClientRegistry;

use crate::loader::{DEFAULT_BATCH_DELAY, Loaders};

/// Execution context for one request.
#[derive(Clone)]
pub struct GatewayContext {
    /// Backend service clients, shared across requests.
    pub registry: ClientRegistry,

    /// The tiered result cache, shared across requests.
    pub cache: Arc<TieredCache>,

    /// Deletes stale keys after mutations.
    pub invalidator: InvalidationCoordinator,

    /// Role and tenant checks.
    pub guard: AccessGuard,

    /// The verified caller.
    pub auth: AuthContext,

    /// The caller's bearer token, propagated to backend services.
    pub token: String,

    /// Request id for tracing and correlation.
    pub request_id: String,

    /// Per-request batching loaders.
    pub loaders: Loaders,

    cancelled: Arc<AtomicBool>,
}

impl GatewayContext {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> GatewayContextBuilder {
        GatewayContextBuilder::default()
    }

    /// Observes client disconnection: in-flight batches complete (keeping
    /// the cache warm), but no new batch windows open.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.loaders.cancel();
        tracing::debug!(request_id = %self.request_id, "Request cancelled");
    }

    /// Whether cancellation has been observed.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for GatewayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayContext")
            .field("request_id", &self.request_id)
            .field("user_id", &self.auth.user_id)
            .field("tenant_id", &self.auth.tenant_id)
            .finish_non_exhaustive()
    }
}

/// Errors from building a [`GatewayContext`].
#[derive(Debug, thiserror::Error)]
pub enum ContextBuilderError {
    /// A required field was not provided.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}

/// Builder validating that all required fields are present.
#[derive(Default)]
pub struct GatewayContextBuilder {
    registry: Option<ClientRegistry>,
    cache: Option<Arc<TieredCache>>,
    guard: Option<AccessGuard>,
    auth: Option<AuthContext>,
    token: Option<String>,
    request_id: Option<String>,
    batch_delay: Option<Duration>,
}

impl GatewayContextBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the shared client registry.
    #[must_use]
    pub fn with_registry(mut self, registry: ClientRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Sets the shared tiered cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<TieredCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the access guard.
    #[must_use]
    pub fn with_guard(mut self, guard: AccessGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Sets the verified caller identity.
    #[must_use]
    pub fn with_auth(mut self, auth: AuthContext) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Sets the caller's bearer token for propagation.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the request id; a UUID is generated when omitted.
    #[must_use]
    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// Overrides the batch window debounce.
    #[must_use]
    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = Some(delay);
        self
    }

    /// Builds the context, creating the per-request loaders.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first missing required field.
    pub fn build(self) -> Result<GatewayContext, ContextBuilderError> {
        let registry = self
            .registry
            .ok_or(ContextBuilderError::MissingField("registry"))?;
        let cache = self.cache.ok_or(ContextBuilderError::MissingField("cache"))?;
        let guard = self.guard.ok_or(ContextBuilderError::MissingField("guard"))?;
        let auth = self.auth.ok_or(ContextBuilderError::MissingField("auth"))?;
        let token = self.token.ok_or(ContextBuilderError::MissingField("token"))?;

        let request_id = self
            .request_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let delay = self.batch_delay.unwrap_or(DEFAULT_BATCH_DELAY);

        // Fresh loaders per request: batching and memoization must never
        // cross request boundaries.
        let loaders = Loaders::new(&registry, cache.clone(), token.clone(), delay);
        let invalidator = InvalidationCoordinator::new(cache.clone());

        Ok(GatewayContext {
            registry,
            cache,
            invalidator,
            guard,
            auth,
            token,
            request_id,
            loaders,
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }
}
