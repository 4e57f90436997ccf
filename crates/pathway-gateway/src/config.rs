//! Gateway configuration.
//!
//! Deserialized from TOML (or any serde source) with per-field defaults,
//! so a minimal file only needs the backend service URLs and the JWT
//! issuer/audience pair:
//!
//! ```toml
//! [auth]
//! issuer = "https://id.pathway.example"
//! audience = "https://gateway.pathway.example"
//!
//! [services]
//! learner_record = "http://learner-record:8080/"
//! iep_document = "http://iep-document:8080/"
//! analytics = "http://analytics:8080/"
//! admin_portal = "http://admin-portal:8080/"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use pathway_clients::ServiceEndpoints;

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Token verification settings.
    pub auth: AuthConfig,

    /// Backend service base URLs.
    pub services: ServicesConfig,

    /// Tiered cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Batch loader settings.
    #[serde(default)]
    pub loader: LoaderConfig,
}

/// Token verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Expected `iss` claim.
    pub issuer: String,

    /// Expected `aud` claim.
    pub audience: String,
}

/// Backend service base URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    /// Learner-record service.
    pub learner_record: Url,

    /// IEP-document service.
    pub iep_document: Url,

    /// Analytics service.
    pub analytics: Url,

    /// Admin-portal service.
    pub admin_portal: Url,

    /// Per-call timeout for backend requests.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl ServicesConfig {
    /// The endpoint set consumed by the client registry.
    #[must_use]
    pub fn endpoints(&self) -> ServiceEndpoints {
        ServiceEndpoints {
            learner_record: self.learner_record.clone(),
            iep_document: self.iep_document.clone(),
            analytics: self.analytics.clone(),
            admin_portal: self.admin_portal.clone(),
        }
    }
}

/// Tiered cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Distributed tier connection URL. When absent the cache runs
    /// local-only, which is the expected shape in tests and single-node
    /// deployments.
    #[serde(default)]
    pub redis_url: Option<String>,

    /// TTL applied when a write does not specify one.
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub default_ttl: Duration,

    /// Entry cap for the process-local tier.
    #[serde(default = "default_local_capacity")]
    pub local_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            default_ttl: default_cache_ttl(),
            local_capacity: default_local_capacity(),
        }
    }
}

/// Batch loader settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Debounce applied before an open batch window dispatches.
    #[serde(default = "default_batch_delay", with = "humantime_serde")]
    pub batch_delay: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_delay: default_batch_delay(),
        }
    }
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_cache_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_local_capacity() -> usize {
    10_000
}

fn default_batch_delay() -> Duration {
    Duration::from_millis(2)
}
