//! Typed cache key builders.
//!
//! Every key the gateway stores is produced here. Centralizing key
//! construction keeps the families collision-free; ad hoc string
//! concatenation at call sites would let two unrelated entity types
//! silently share a key.
//!
//! Families:
//!
//! - entity keys: `{entity_type}:{id}` (e.g. `iep:42`)
//! - listing keys: `student_ieps:{student_id}`, `tenant_students:{tenant_id}`
//! - query-result keys: `qr:{query_hash}:{variables_hash}[:user:{user_id}]`
//!
//! The query-result hashes are SHA-256 over canonical forms: query text is
//! hashed as-is, variables are serialized with recursively sorted object
//! keys so `{a:1,b:2}` and `{b:2,a:1}` always map to the same key.

use pathway_core::EntityType;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Hash length (hex chars) used in query-result keys. 128 bits is plenty
/// for a cache namespace while keeping keys readable in Redis tooling.
const HASH_LEN: usize = 32;

/// Whether a query-result entry is shared or scoped to the viewing user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryScope {
    /// The result is identical for every caller allowed to see it.
    Shared,
    /// The result depends on the viewer; the key carries the user id.
    PerUser(String),
}

/// Builds an entity cache key, e.g. `iep:42`.
#[must_use]
pub fn entity_key(entity_type: EntityType, id: &str) -> String {
    format!("{}:{}", entity_type.as_str(), id)
}

/// Builds the listing key for all IEPs of one learner.
#[must_use]
pub fn student_ieps_key(student_id: &str) -> String {
    format!("student_ieps:{student_id}")
}

/// Builds the listing key for all learners of one tenant.
#[must_use]
pub fn tenant_students_key(tenant_id: &str) -> String {
    format!("tenant_students:{tenant_id}")
}

/// Key prefixes holding tenant-derived aggregates, used by tenant-wide
/// invalidation. Entity keys are not tenant-discriminated and are covered
/// by per-entity invalidation rules and their TTL instead.
#[must_use]
pub fn tenant_prefixes(tenant_id: &str) -> Vec<String> {
    vec![
        tenant_students_key(tenant_id),
        entity_key(EntityType::TenantSettings, tenant_id),
    ]
}

/// Builds a query-result cache key.
///
/// Identical query text and semantically equal variables always produce
/// the same key, independent of variable property order.
#[must_use]
pub fn query_result_key(query: &str, variables: &Value, scope: &QueryScope) -> String {
    let query_hash = sha256_hex(query.as_bytes());
    let variables_hash = sha256_hex(canonical_json(variables).as_bytes());

    let mut key = format!(
        "qr:{}:{}",
        &query_hash[..HASH_LEN],
        &variables_hash[..HASH_LEN]
    );
    if let QueryScope::PerUser(user_id) = scope {
        key.push_str(":user:");
        key.push_str(user_id);
    }
    key
}

/// Serializes a JSON value with object keys recursively sorted.
///
/// `serde_json`'s default map is ordered, but canonicalization must not
/// depend on a feature flag a downstream crate could flip (`preserve_order`
/// is additive across the build graph).
fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
