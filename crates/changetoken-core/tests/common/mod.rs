//! Test doubles and common utilities for retry contract tests
//!
//! These doubles count every remote call so the tests can assert exactly how
//! many token fetches and operation invocations a scenario produced.

#![allow(dead_code)]

use changetoken_core::error::{Error, Result};
use changetoken_core::policy::{Backoff, RetryPolicy};
use changetoken_core::traits::{ChangeToken, ChangeTokenSource};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A token source issuing sequential tokens, optionally failing first
#[derive(Clone)]
pub struct ScriptedTokenSource {
    /// Call counter for fetch_change_token()
    fetch_count: Arc<AtomicUsize>,
    /// Errors returned by the next fetches, in order
    fetch_failures: Arc<Mutex<VecDeque<Error>>>,
    /// Every token handed out
    issued: Arc<Mutex<Vec<String>>>,
}

impl ScriptedTokenSource {
    pub fn new() -> Self {
        Self {
            fetch_count: Arc::new(AtomicUsize::new(0)),
            fetch_failures: Arc::new(Mutex::new(VecDeque::new())),
            issued: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make the next fetches fail with `errors`, in order
    pub fn failing_with(errors: Vec<Error>) -> Self {
        let source = Self::new();
        source.fetch_failures.lock().unwrap().extend(errors);
        source
    }

    /// Get the number of times fetch_change_token() was called
    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Tokens issued so far
    pub fn issued(&self) -> Vec<String> {
        self.issued.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ChangeTokenSource for ScriptedTokenSource {
    async fn fetch_change_token(&self) -> Result<ChangeToken> {
        let n = self.fetch_count.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.fetch_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        let token = format!("change-token-{:04}", n);
        self.issued.lock().unwrap().push(token.clone());
        Ok(ChangeToken::new(token))
    }

    fn source_name(&self) -> &'static str {
        "scripted"
    }
}

/// A mutating operation that replays a script of outcomes
///
/// Once the script runs out, every further call returns the last outcome
/// kind again (`fallback`).
#[derive(Clone)]
pub struct ScriptedOperation {
    /// Call counter
    call_count: Arc<AtomicUsize>,
    /// Outcomes for the next calls: `Ok(value)` or `Err(error)`
    script: Arc<Mutex<VecDeque<Result<u32>>>>,
    /// Produces the outcome once the script is empty
    fallback: Arc<dyn Fn() -> Result<u32> + Send + Sync>,
    /// Tokens received, in order
    tokens_seen: Arc<Mutex<Vec<String>>>,
}

impl ScriptedOperation {
    pub fn new(script: Vec<Result<u32>>, fallback: impl Fn() -> Result<u32> + Send + Sync + 'static) -> Self {
        Self {
            call_count: Arc::new(AtomicUsize::new(0)),
            script: Arc::new(Mutex::new(script.into())),
            fallback: Arc::new(fallback),
            tokens_seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// `failures` followed by `Ok(value)`
    pub fn failing_then(failures: Vec<Error>, value: u32) -> Self {
        let mut script: Vec<Result<u32>> = failures.into_iter().map(Err).collect();
        script.push(Ok(value));
        Self::new(script, move || Ok(value))
    }

    /// Always fails with a fresh error from `make`
    pub fn always_failing(make: impl Fn() -> Error + Send + Sync + 'static) -> Self {
        Self::new(Vec::new(), move || Err(make()))
    }

    /// Get the number of invocations
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Tokens received so far
    pub fn tokens_seen(&self) -> Vec<String> {
        self.tokens_seen.lock().unwrap().clone()
    }

    /// Invoke the operation with `token`
    pub async fn call(&self, token: ChangeToken) -> Result<u32> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen.lock().unwrap().push(token.into_inner());

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(outcome) => outcome,
            None => (self.fallback)(),
        }
    }
}

/// A remote API enforcing the single-valid-token rule
///
/// Fetching a token invalidates every earlier one; a mutation succeeds only
/// with the most recently issued, not yet consumed token.
#[derive(Clone, Default)]
pub struct TokenGuardedRemote {
    state: Arc<Mutex<RemoteState>>,
}

#[derive(Default)]
struct RemoteState {
    next: usize,
    current: Option<String>,
    consumed: HashSet<String>,
    applied: Vec<String>,
    stale_rejections: usize,
}

impl TokenGuardedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply `change` if `token` is current
    pub fn mutate(&self, token: ChangeToken, change: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let token = token.into_inner();

        if state.consumed.contains(&token) {
            panic!("change token {} was used twice", token);
        }

        if state.current.as_deref() != Some(token.as_str()) {
            state.stale_rejections += 1;
            return Err(Error::stale_token(format!("token {} superseded", token)));
        }

        state.consumed.insert(token.clone());
        state.current = None;
        state.applied.push(change.to_string());
        Ok(token)
    }

    /// Changes applied, in order
    pub fn applied(&self) -> Vec<String> {
        self.state.lock().unwrap().applied.clone()
    }

    /// Number of mutations rejected for a stale token
    pub fn stale_rejections(&self) -> usize {
        self.state.lock().unwrap().stale_rejections
    }
}

#[async_trait::async_trait]
impl ChangeTokenSource for TokenGuardedRemote {
    async fn fetch_change_token(&self) -> Result<ChangeToken> {
        let mut state = self.state.lock().unwrap();
        let token = format!("guarded-{}", state.next);
        state.next += 1;
        state.current = Some(token.clone());
        Ok(ChangeToken::new(token))
    }

    fn source_name(&self) -> &'static str {
        "token-guarded"
    }
}

/// Policy with no delay and a generous budget
pub fn immediate_policy() -> RetryPolicy {
    RetryPolicy::new(Duration::from_secs(60), Backoff::Fixed(Duration::ZERO))
}

/// Policy with a fixed delay and a budget
pub fn fixed_policy(delay: Duration, budget: Duration) -> RetryPolicy {
    RetryPolicy::new(budget, Backoff::Fixed(delay))
}
