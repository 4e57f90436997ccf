//! Error type for gateway operations.
//!
//! Mirrors the request-level taxonomy: authentication errors kill the
//! request, authorization and backend errors kill the field, loader
//! protocol errors kill the batch window. Cache errors never appear here;
//! they degrade inside the cache layer.

use std::sync::Arc;

use pathway_auth::AuthError;
use pathway_clients::ClientError;

use crate::loader::LoaderError;

/// Errors surfaced by gateway query and mutation operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    /// Authentication or authorization failure.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A backend service call failed. The message is already sanitized.
    #[error(transparent)]
    Backend(#[from] ClientError),

    /// The batching loader failed (protocol error, cancellation, or a
    /// batch-level backend failure).
    #[error(transparent)]
    Loader(Arc<LoaderError>),

    /// A gateway-internal invariant broke.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the error code for GraphQL error extensions.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Auth(e) => e.error_code(),
            Self::Backend(_) => "BACKEND_ERROR",
            Self::Loader(e) => match **e {
                LoaderError::ProtocolMismatch { .. } => "LOADER_PROTOCOL_ERROR",
                LoaderError::Cancelled => "REQUEST_CANCELLED",
                _ => "LOADER_ERROR",
            },
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns `true` if the whole request should stop (authentication
    /// failure) rather than the single field.
    #[must_use]
    pub fn is_request_fatal(&self) -> bool {
        matches!(self, Self::Auth(e) if e.is_authentication_error())
    }
}

impl From<Arc<LoaderError>> for GatewayError {
    fn from(err: Arc<LoaderError>) -> Self {
        // A batch-level backend failure is reported as a backend error so
        // callers see one taxonomy regardless of the path it took.
        match &*err {
            LoaderError::Backend(client_err) => Self::Backend(client_err.clone()),
            _ => Self::Loader(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            GatewayError::Auth(AuthError::Forbidden).error_code(),
            "FORBIDDEN"
        );
        assert_eq!(
            GatewayError::Backend(ClientError::Timeout { service: "ieps" }).error_code(),
            "BACKEND_ERROR"
        );
        assert_eq!(
            GatewayError::Loader(Arc::new(LoaderError::ProtocolMismatch {
                requested: 2,
                returned: 1
            }))
            .error_code(),
            "LOADER_PROTOCOL_ERROR"
        );
    }

    #[test]
    fn test_backend_loader_error_unwraps_to_backend() {
        let loader_err = Arc::new(LoaderError::Backend(ClientError::Status {
            service: "ieps",
            status: 503,
        }));
        let err = GatewayError::from(loader_err);
        assert!(matches!(err, GatewayError::Backend(_)));
    }

    #[test]
    fn test_request_fatal_only_for_authentication() {
        assert!(GatewayError::Auth(AuthError::MissingToken).is_request_fatal());
        assert!(!GatewayError::Auth(AuthError::Forbidden).is_request_fatal());
        assert!(
            !GatewayError::Backend(ClientError::NotFound { service: "ieps" }).is_request_fatal()
        );
    }
}
