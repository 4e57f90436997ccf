//! Error types for backend service calls.

/// Errors from a backend service client.
///
/// Messages are sanitized for propagation into GraphQL field errors: they
/// name the service and status, never the backend's internal diagnostics
/// (those go to the log).
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    /// The entity does not exist (HTTP 404).
    #[error("{service}: not found")]
    NotFound {
        /// Which backend service answered.
        service: &'static str,
    },

    /// The service answered with a non-2xx status.
    #[error("{service} returned status {status}")]
    Status {
        /// Which backend service answered.
        service: &'static str,
        /// The HTTP status code.
        status: u16,
    },

    /// The request timed out.
    #[error("{service}: request timed out")]
    Timeout {
        /// Which backend service was called.
        service: &'static str,
    },

    /// The connection failed before a status was received.
    #[error("{service}: transport error")]
    Transport {
        /// Which backend service was called.
        service: &'static str,
    },

    /// A 2xx body failed to deserialize into the expected shape.
    #[error("{service}: unexpected response shape")]
    Decode {
        /// Which backend service answered.
        service: &'static str,
    },
}

impl ClientError {
    /// Returns `true` when retrying the call might succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Transport { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::NotFound { .. } | Self::Decode { .. } => false,
        }
    }

    /// Which backend service produced the error.
    #[must_use]
    pub fn service(&self) -> &'static str {
        match self {
            Self::NotFound { service }
            | Self::Status { service, .. }
            | Self::Timeout { service }
            | Self::Transport { service }
            | Self::Decode { service } => service,
        }
    }
}
