//! Error types for the change-token retry core
//!
//! Every failure a mutating call can produce is mapped once, at the API
//! boundary, onto one of the variants below. The retryer only ever looks at
//! [`Error::kind`] to decide whether to try again.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for change-token operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of an [`Error`]
///
/// This is the vocabulary retry policies are written in. The set is closed:
/// adapters translate provider error codes into one of these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Another mutation consumed a newer change token first
    StaleToken,
    /// The remote detected an overlapping write
    ConcurrentModification,
    /// The target is not visible yet after a prior create
    NotPropagated,
    /// Request rate exceeded
    Throttled,
    /// The target does not exist
    NotFound,
    /// Credentials lack permission for the call
    PermissionDenied,
    /// The request was malformed or rejected on validation
    InvalidInput,
    /// An account or service limit was hit
    LimitExceeded,
    /// The target is still referenced by, or contains, other entities
    InUse,
    /// Local configuration problem
    Config,
    /// Any other provider failure
    Provider,
    /// Retry budget exhausted
    Timeout,
    /// Caller canceled the operation
    Canceled,
    /// Non-retryable failure annotated with its operation
    Fatal,
    /// Anything else
    Other,
}

impl ErrorKind {
    /// Kinds retried by the default policy
    pub const DEFAULT_RETRYABLE: [ErrorKind; 4] = [
        ErrorKind::StaleToken,
        ErrorKind::ConcurrentModification,
        ErrorKind::NotPropagated,
        ErrorKind::Throttled,
    ];

    /// Terminal kinds produced by the retryer itself. A policy can never
    /// make these retryable.
    pub fn is_terminal(self) -> bool {
        matches!(self, ErrorKind::Timeout | ErrorKind::Canceled | ErrorKind::Fatal)
    }
}

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// The change token used for the call was superseded
    #[error("Stale change token: {0}")]
    StaleToken(String),

    /// Overlapping write detected by the remote
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// Resource not yet visible after creation
    #[error("Not yet propagated: {0}")]
    NotPropagated(String),

    /// Rate limiting
    #[error("Rate limited: {0}")]
    Throttled(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Permission errors
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Limit errors
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    /// Resource still referenced or non-empty
    #[error("Resource in use: {0}")]
    InUse(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// The retry budget ran out while the remote kept returning retryable
    /// errors. Displays the last of them.
    #[error("Timed out after {elapsed:?} ({attempts} attempts): {last}")]
    Timeout {
        /// Time spent retrying
        elapsed: Duration,
        /// Number of attempts made
        attempts: usize,
        /// The last retryable error observed
        last: Box<Error>,
    },

    /// The caller canceled the context
    #[error("Operation canceled")]
    Canceled,

    /// A non-retryable error, annotated for diagnostics
    #[error("{operation} ({target}) failed: {source}")]
    Fatal {
        /// Name of the failing call
        operation: String,
        /// Identifier of the resource the call targeted
        target: String,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors (config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a stale-token error
    pub fn stale_token(msg: impl Into<String>) -> Self {
        Self::StaleToken(msg.into())
    }

    /// Create a concurrent-modification error
    pub fn concurrent_modification(msg: impl Into<String>) -> Self {
        Self::ConcurrentModification(msg.into())
    }

    /// Create a not-yet-propagated error
    pub fn not_propagated(msg: impl Into<String>) -> Self {
        Self::NotPropagated(msg.into())
    }

    /// Create a rate limit error
    pub fn throttled(msg: impl Into<String>) -> Self {
        Self::Throttled(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a permission error
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a limit error
    pub fn limit_exceeded(msg: impl Into<String>) -> Self {
        Self::LimitExceeded(msg.into())
    }

    /// Create an in-use error
    pub fn in_use(msg: impl Into<String>) -> Self {
        Self::InUse(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Wrap `source` as a fatal error for `operation` on `target`
    pub fn fatal(operation: impl Into<String>, target: impl Into<String>, source: Error) -> Self {
        Self::Fatal {
            operation: operation.into(),
            target: target.into(),
            source: Box::new(source),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::StaleToken(_) => ErrorKind::StaleToken,
            Error::ConcurrentModification(_) => ErrorKind::ConcurrentModification,
            Error::NotPropagated(_) => ErrorKind::NotPropagated,
            Error::Throttled(_) => ErrorKind::Throttled,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::LimitExceeded(_) => ErrorKind::LimitExceeded,
            Error::InUse(_) => ErrorKind::InUse,
            Error::Config(_) | Error::Json(_) | Error::Io(_) => ErrorKind::Config,
            Error::Provider { .. } => ErrorKind::Provider,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Canceled => ErrorKind::Canceled,
            Error::Fatal { .. } => ErrorKind::Fatal,
            Error::Other(_) => ErrorKind::Other,
        }
    }

    /// Check if this is a "not found" error, looking through the
    /// [`Error::Fatal`] wrapper
    pub fn is_not_found(&self) -> bool {
        self.root_cause().kind() == ErrorKind::NotFound
    }

    /// The innermost error, unwrapping `Fatal` and `Timeout`
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Fatal { source, .. } => source.root_cause(),
            Error::Timeout { last, .. } => last.root_cause(),
            other => other,
        }
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
