//! Node-level error type.

use std::time::Duration;

use thiserror::Error;

use crate::Provider;

/// Errors raised inside an adapter while executing one operation.
///
/// These never cross the adapter boundary: [`crate::OperationResult::from_outcome`]
/// folds them into a failed result carrying [`NodeError::code`].
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    /// The interpolated configuration is missing a field or has the wrong shape.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The node's input data could not be processed (e.g. malformed JSON).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No credential bundle was supplied for a provider that needs one.
    #[error("missing credentials for provider '{0}'")]
    MissingCredentials(Provider),

    /// The supplied OAuth2 bundle is past its expiry.
    #[error("credentials for provider '{0}' have expired")]
    CredentialExpired(Provider),

    /// The upstream API answered with a non-success status.
    #[error("upstream returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The upstream call exceeded its timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, TLS or body-streaming failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The upstream answered 2xx but the body was not what we expected.
    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    /// The adapter was handed an operation it does not implement.
    #[error("operation '{0}' is not supported by this adapter")]
    Unsupported(crate::OperationId),
}

impl NodeError {
    /// Stable machine-readable code recorded in `OperationResult.error.code`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "invalid_config",
            Self::InvalidInput(_) => "invalid_input",
            Self::MissingCredentials(_) => "missing_credentials",
            Self::CredentialExpired(_) => "credential_expired",
            Self::Upstream { .. } => "upstream_error",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport_error",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Unsupported(_) => "unsupported_operation",
        }
    }
}
