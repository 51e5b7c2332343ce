//! Change-token serialized retry
//!
//! The ChangeTokenRetryer is responsible for:
//! - Fetching a fresh change token before every attempt
//! - Invoking the caller's mutating operation with that token
//! - Classifying failures via the [`RetryPolicy`]
//! - Backing off between attempts while honouring cancellation and deadlines
//!
//! ## Attempt Flow
//!
//! ```text
//!   Idle ──► FetchingToken ──► Invoking ──► Success
//!                 ▲               │
//!                 │               ├──► RetryableFailure ── backoff ──┐
//!                 │               │                                  │
//!                 └───────────────┼──────────────────────────────────┘
//!                                 └──► FatalFailure
//!
//!   Terminal: Success | FatalFailure | Timeout | Canceled
//! ```
//!
//! There is no local lock: the remote API serializes mutations by rejecting
//! superseded tokens, and the retryer turns those rejections into new
//! attempts.

use crate::context::RetryContext;
use crate::error::{Error, ErrorKind, Result};
use crate::policy::RetryPolicy;
use crate::traits::{ChangeToken, ChangeTokenSource};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Operation name used when the token fetch itself fails
const FETCH_OPERATION: &str = "GetChangeToken";

/// Events emitted by the ChangeTokenRetryer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryEvent {
    /// A fetch-and-invoke cycle is starting
    AttemptStarted {
        operation: String,
        target: String,
        attempt: usize,
    },

    /// A change token was issued for the attempt
    TokenFetched { operation: String, attempt: usize },

    /// The attempt failed with a retryable error; another follows after `delay`
    AttemptFailed {
        operation: String,
        target: String,
        attempt: usize,
        kind: ErrorKind,
        delay: Duration,
    },

    /// The operation succeeded
    Succeeded {
        operation: String,
        target: String,
        attempts: usize,
    },

    /// The retryer stopped without success
    GaveUp {
        operation: String,
        target: String,
        attempts: usize,
        kind: ErrorKind,
    },
}

/// Where in an attempt a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    FetchToken,
    Invoke,
}

/// Serializes mutating calls behind single-use change tokens
///
/// ## Lifecycle
///
/// 1. Create with [`ChangeTokenRetryer::new()`] around a token source
/// 2. Optionally set a policy and subscribe to events
/// 3. Call [`ChangeTokenRetryer::retry_with_token()`] for every mutation
///
/// ## Threading
///
/// The retryer holds no mutable state; it can be shared and used from any
/// number of tasks at once. It never spawns tasks.
#[derive(Debug, Clone)]
pub struct ChangeTokenRetryer<S> {
    /// Change token source
    source: S,

    /// Retry policy
    policy: RetryPolicy,

    /// Event sender for external monitoring
    event_tx: Option<mpsc::Sender<RetryEvent>>,
}

impl<S: ChangeTokenSource> ChangeTokenRetryer<S> {
    /// Create a retryer with the default policy
    pub fn new(source: S) -> Self {
        Self {
            source,
            policy: RetryPolicy::default(),
            event_tx: None,
        }
    }

    /// Replace the retry policy
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Emit [`RetryEvent`]s into a bounded channel of `capacity`
    ///
    /// # Returns
    ///
    /// A tuple of (retryer, event_receiver)
    pub fn with_events(mut self, capacity: usize) -> (Self, mpsc::Receiver<RetryEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.event_tx = Some(tx);
        (self, rx)
    }

    /// Emit events into an existing channel
    pub fn with_event_sender(mut self, tx: mpsc::Sender<RetryEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// The active retry policy
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The token source
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run `operation` with a freshly fetched change token, retrying the
    /// fetch-and-invoke cycle on retryable failures
    ///
    /// # Parameters
    ///
    /// - `ctx`: cancellation, optional deadline and diagnostic labels
    /// - `operation`: the mutating call; invoked once per attempt with the
    ///   token fetched for that attempt, so it must be safe to repeat
    ///
    /// # Returns
    ///
    /// - `Ok(T)`: the value of the first successful invocation
    /// - `Err(Error::Fatal)`: a non-retryable error, from the token fetch
    ///   (operation `GetChangeToken`) or the operation itself
    /// - `Err(Error::Timeout)`: the policy budget (or the context deadline)
    ///   ran out; wraps the last retryable error
    /// - `Err(Error::Canceled)`: the context was canceled
    ///
    /// The deadline is checked between attempts; cancellation also aborts an
    /// attempt that is in flight.
    pub async fn retry_with_token<T, F, Fut>(&self, ctx: &RetryContext, mut operation: F) -> Result<T>
    where
        F: FnMut(ChangeToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        // A budget past the end of the clock means no budget deadline
        let budget_deadline = started.checked_add(self.policy.max_elapsed());
        let deadline = match (ctx.deadline(), budget_deadline) {
            (Some(ctx_deadline), Some(budget)) => Some(ctx_deadline.min(budget)),
            (ctx_deadline, budget) => ctx_deadline.or(budget),
        };

        let mut attempt = 0usize;

        loop {
            attempt += 1;

            if ctx.is_canceled() {
                return Err(self.give_up(ctx, attempt - 1, Error::Canceled));
            }

            self.emit_event(RetryEvent::AttemptStarted {
                operation: ctx.operation().to_string(),
                target: ctx.target().to_string(),
                attempt,
            });
            debug!(
                "{} ({}): attempt {} via {}",
                ctx.operation(),
                ctx.target(),
                attempt,
                self.source.source_name()
            );

            let outcome = tokio::select! {
                biased;

                _ = ctx.cancellation_token().cancelled() => {
                    return Err(self.give_up(ctx, attempt, Error::Canceled));
                }

                outcome = self.attempt(ctx, attempt, &mut operation) => outcome,
            };

            let (stage, error) = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        info!(
                            "{} ({}) succeeded after {} attempts",
                            ctx.operation(),
                            ctx.target(),
                            attempt
                        );
                    }
                    self.emit_event(RetryEvent::Succeeded {
                        operation: ctx.operation().to_string(),
                        target: ctx.target().to_string(),
                        attempts: attempt,
                    });
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            if !self.policy.is_retryable(&error) {
                let operation = match stage {
                    Stage::FetchToken => FETCH_OPERATION,
                    Stage::Invoke => ctx.operation(),
                };
                warn!(
                    "{} ({}) failed with non-retryable error: {}",
                    operation,
                    ctx.target(),
                    error
                );
                let fatal = Error::fatal(operation, ctx.target(), error);
                return Err(self.give_up(ctx, attempt, fatal));
            }

            let now = Instant::now();
            if deadline.is_some_and(|d| now >= d) {
                let timeout = Error::Timeout {
                    elapsed: now - started,
                    attempts: attempt,
                    last: Box::new(error),
                };
                warn!("{} ({}): {}", ctx.operation(), ctx.target(), timeout);
                return Err(self.give_up(ctx, attempt, timeout));
            }

            let retry_index = u32::try_from(attempt - 1).unwrap_or(u32::MAX);
            let mut delay = self.policy.delay_for(retry_index);
            if let Some(deadline) = deadline {
                delay = delay.min(deadline - now);
            }

            debug!(
                "{} ({}): attempt {} hit {:?} ({}), retrying in {:?}",
                ctx.operation(),
                ctx.target(),
                attempt,
                error.kind(),
                error,
                delay
            );
            self.emit_event(RetryEvent::AttemptFailed {
                operation: ctx.operation().to_string(),
                target: ctx.target().to_string(),
                attempt,
                kind: error.kind(),
                delay,
            });

            tokio::select! {
                biased;

                _ = ctx.cancellation_token().cancelled() => {
                    return Err(self.give_up(ctx, attempt, Error::Canceled));
                }

                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// One fetch-and-invoke cycle
    async fn attempt<T, F, Fut>(
        &self,
        ctx: &RetryContext,
        attempt: usize,
        operation: &mut F,
    ) -> std::result::Result<T, (Stage, Error)>
    where
        F: FnMut(ChangeToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let token = self
            .source
            .fetch_change_token()
            .await
            .map_err(|e| (Stage::FetchToken, e))?;

        self.emit_event(RetryEvent::TokenFetched {
            operation: ctx.operation().to_string(),
            attempt,
        });

        operation(token).await.map_err(|e| (Stage::Invoke, e))
    }

    /// Record a terminal failure and hand the error back
    fn give_up(&self, ctx: &RetryContext, attempts: usize, error: Error) -> Error {
        if matches!(error, Error::Canceled) {
            info!("{} ({}) canceled", ctx.operation(), ctx.target());
        }
        self.emit_event(RetryEvent::GaveUp {
            operation: ctx.operation().to_string(),
            target: ctx.target().to_string(),
            attempts,
            kind: error.kind(),
        });
        error
    }

    /// Emit a retry event
    fn emit_event(&self, event: RetryEvent) {
        let Some(tx) = &self.event_tx else {
            return;
        };

        // A slow consumer must never stall the retry loop
        if tx.try_send(event).is_err() {
            warn!("Retry event channel full or closed, dropping event");
        }
    }
}
