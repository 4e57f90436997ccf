//! Error types for authentication and authorization.

/// Errors produced by token verification and the access guard.
///
/// Authentication failures (missing/invalid/expired token) are fatal to the
/// whole request. Authorization failures are fatal only to the field being
/// resolved and intentionally carry no detail about the target entity.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    /// No bearer token was supplied.
    #[error("Missing Authorization header")]
    MissingToken,

    /// The token failed to parse or its signature did not verify.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of the verification failure.
        message: String,
    },

    /// The token's expiry is in the past.
    #[error("Token expired")]
    TokenExpired,

    /// The token's claims are malformed or fail issuer/audience checks.
    #[error("Invalid claims: {message}")]
    InvalidClaims {
        /// Description of why the claims are invalid.
        message: String,
    },

    /// Role or tenant check failed. The message is deliberately generic:
    /// it must not reveal whether the entity exists.
    #[error("Insufficient permissions")]
    Forbidden,
}

impl AuthError {
    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClaims` error.
    #[must_use]
    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims {
            message: message.into(),
        }
    }

    /// Returns `true` if this error should terminate the whole request
    /// (authentication failure) rather than a single field.
    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        !matches!(self, Self::Forbidden)
    }

    /// Returns the error code exposed in GraphQL error extensions.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::MissingToken | Self::InvalidToken { .. } | Self::InvalidClaims { .. } => {
                "UNAUTHENTICATED"
            }
            Self::TokenExpired => "TOKEN_EXPIRED",
            Self::Forbidden => "FORBIDDEN",
        }
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => Self::TokenExpired,
            ErrorKind::InvalidAudience
            | ErrorKind::InvalidIssuer
            | ErrorKind::InvalidSubject
            | ErrorKind::MissingRequiredClaim(_) => Self::invalid_claims(err.to_string()),
            _ => Self::invalid_token(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forbidden_message_is_generic() {
        // The denied path must not leak anything about the target.
        assert_eq!(AuthError::Forbidden.to_string(), "Insufficient permissions");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(AuthError::MissingToken.error_code(), "UNAUTHENTICATED");
        assert_eq!(AuthError::TokenExpired.error_code(), "TOKEN_EXPIRED");
        assert_eq!(AuthError::Forbidden.error_code(), "FORBIDDEN");
    }

    #[test]
    fn test_authentication_vs_authorization() {
        assert!(AuthError::MissingToken.is_authentication_error());
        assert!(AuthError::TokenExpired.is_authentication_error());
        assert!(!AuthError::Forbidden.is_authentication_error());
    }
}
