//! Execution context for a retried call
//!
//! Carries what the caller controls: cancellation, an optional hard deadline,
//! and the labels used to annotate errors and log lines.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Context passed to [`crate::ChangeTokenRetryer::retry_with_token`]
#[derive(Debug, Clone)]
pub struct RetryContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
    operation: String,
    target: String,
}

impl RetryContext {
    /// Create a context that is never canceled and has no deadline
    pub fn new() -> Self {
        Self::with_cancellation(CancellationToken::new())
    }

    /// Create a context bound to an existing cancellation token
    pub fn with_cancellation(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
            operation: "mutation".to_string(),
            target: "-".to_string(),
        }
    }

    /// Label the call for diagnostics
    ///
    /// # Parameters
    ///
    /// - `operation`: API call name (e.g. "UpdateRegexMatchSet")
    /// - `target`: identifier of the resource being changed
    pub fn for_operation(mut self, operation: impl Into<String>, target: impl Into<String>) -> Self {
        self.operation = operation.into();
        self.target = target.into();
        self
    }

    /// Give up once `timeout` has passed, in addition to the policy budget
    ///
    /// A timeout too large to represent leaves the context without a deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    /// Give up at `deadline`, in addition to the policy budget
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Derive a context canceled together with this one, with new labels
    pub fn child(&self, operation: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
            operation: operation.into(),
            target: target.into(),
        }
    }

    /// Cancel this context (and its children)
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the context has been canceled
    pub fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The cancellation token
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Caller deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Operation label
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Target label
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Default for RetryContext {
    fn default() -> Self {
        Self::new()
    }
}
