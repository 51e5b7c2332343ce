// # Change Token Source Trait
//
// Defines the capability the retryer consumes: "give me a fresh change token".
//
// ## Implementations
//
// - AWS WAF Classic: `changetoken-waf` crate (`GetChangeToken`)
// - Test doubles: `tests/common/mod.rs`
//
// ## Usage
//
// ```rust,ignore
// use changetoken_core::ChangeTokenSource;
//
// let token = source.fetch_change_token().await?;
// client.delete_thing(id, token).await?;
// ```

use async_trait::async_trait;
use std::fmt;

/// An opaque, single-use change token
///
/// A token is valid for exactly one subsequent mutating call. It is moved
/// into the call that uses it and cannot be cloned, so the type system keeps
/// it from being used twice.
///
/// ```compile_fail
/// let token = changetoken_core::ChangeToken::new("token-1");
/// let again = token.clone();
/// ```
#[derive(PartialEq, Eq, Hash)]
pub struct ChangeToken(String);

impl ChangeToken {
    /// Wrap a token string returned by the remote API
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into the raw token
    pub fn into_inner(self) -> String {
        self.0
    }
}

// Tokens authorize writes; keep them out of logs.
impl fmt::Debug for ChangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ChangeToken").field(&"<REDACTED>").finish()
    }
}

/// Source of change tokens
///
/// # Trust Level: Untrusted
///
/// Sources are thin API adapters:
/// - ✅ Perform one token request per call
/// - ✅ Classify failures into [`crate::Error`] variants
/// - ❌ Retry, back off or sleep (owned by `ChangeTokenRetryer`)
/// - ❌ Cache tokens (a cached token is a stale token)
#[async_trait]
pub trait ChangeTokenSource: Send + Sync {
    /// Request a new change token from the remote API
    ///
    /// # Returns
    ///
    /// - `Ok(ChangeToken)`: a token valid for one mutating call
    /// - `Err(Error)`: classified fetch failure (e.g. `Throttled`)
    async fn fetch_change_token(&self) -> Result<ChangeToken, crate::Error>;

    /// Get the source name (for logging/debugging)
    fn source_name(&self) -> &'static str;
}

#[async_trait]
impl<T: ChangeTokenSource + ?Sized> ChangeTokenSource for std::sync::Arc<T> {
    async fn fetch_change_token(&self) -> Result<ChangeToken, crate::Error> {
        (**self).fetch_change_token().await
    }

    fn source_name(&self) -> &'static str {
        (**self).source_name()
    }
}
