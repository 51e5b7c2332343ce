// # changetoken-core
//
// Core library for serializing mutations against APIs that guard every write
// with a single-use change token (AWS WAF Classic and WAF Regional).
//
// ## Architecture Overview
//
// - **ChangeTokenSource**: Trait for fetching a fresh change token
// - **ChangeTokenRetryer**: Fetch-token-then-invoke loop with retry on conflict
// - **RetryPolicy**: Time budget, backoff schedule, retryable error kinds
// - **PolicyRegistry**: Per resource type policies, loadable from config
// - **RetryContext**: Cancellation, deadline and diagnostic labels
//
// ## Design Principles
//
// 1. **Remote Serialization**: No local lock; the remote rejects stale tokens
// 2. **Fresh Tokens**: One token per attempt, never cached or reused
// 3. **Closed Error Taxonomy**: Adapters classify once, the retryer matches kinds
// 4. **Injectable Policy**: Budgets and schedules are data, not call-site constants
// 5. **Prompt Cancellation**: No wait outlives a canceled context

pub mod traits;
pub mod retryer;
pub mod policy;
pub mod registry;
pub mod context;
pub mod config;
pub mod error;

// Re-export core types for convenience
pub use traits::{ChangeToken, ChangeTokenSource};
pub use retryer::{ChangeTokenRetryer, RetryEvent};
pub use policy::{Backoff, RetryPolicy};
pub use registry::PolicyRegistry;
pub use context::RetryContext;
pub use config::{BackoffConfig, RetryConfig, RetryPoliciesConfig};
pub use error::{Error, ErrorKind, Result};
