//! Access token claims.
//!
//! The gateway only *verifies* tokens; issuance lives in the identity
//! service. Claims follow the platform's standard access-token shape.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller roles recognized by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// District administrator; manages tenant-wide settings.
    Admin,
    /// Classroom teacher.
    Teacher,
    /// Related service provider (speech, OT, counseling).
    Provider,
    /// Parent or legal guardian.
    Guardian,
}

impl Role {
    /// Returns the role name as carried in token claims.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Teacher => "teacher",
            Self::Provider => "provider",
            Self::Guardian => "guardian",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verified access token claims.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Issuer (identity service URL).
    pub iss: String,

    /// Subject (user id).
    pub sub: String,

    /// Audience (gateway URLs).
    pub aud: Vec<String>,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Caller email.
    pub email: String,

    /// Caller role.
    pub role: Role,

    /// Owning tenant id.
    pub tenant_id: String,

    /// Space-separated granted scopes.
    #[serde(default)]
    pub scope: String,
}

impl AccessClaims {
    /// Returns the granted scopes as individual strings.
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.scope
            .split_whitespace()
            .map(ToString::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> AccessClaims {
        AccessClaims {
            iss: "https://id.example.org".into(),
            sub: "u-1".into(),
            aud: vec!["https://gateway.example.org".into()],
            exp: 2_000_000_000,
            iat: 1_700_000_000,
            email: "teacher@example.org".into(),
            role: Role::Teacher,
            tenant_id: "district-7".into(),
            scope: "records:read ieps:write".into(),
        }
    }

    #[test]
    fn test_scopes_split_on_whitespace() {
        assert_eq!(claims().scopes(), vec!["records:read", "ieps:write"]);
    }

    #[test]
    fn test_role_round_trips_snake_case() {
        let json = serde_json::to_string(&Role::Guardian).unwrap();
        assert_eq!(json, "\"guardian\"");
        let back: Role = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Role::Guardian);
    }

    #[test]
    fn test_claims_deserialize_without_scope() {
        let value = serde_json::json!({
            "iss": "https://id.example.org",
            "sub": "u-1",
            "aud": ["https://gateway.example.org"],
            "exp": 2_000_000_000,
            "iat": 1_700_000_000,
            "email": "a@b.c",
            "role": "admin",
            "tenant_id": "district-7"
        });
        let claims: AccessClaims = serde_json::from_value(value).unwrap();
        assert!(claims.scopes().is_empty());
    }
}
