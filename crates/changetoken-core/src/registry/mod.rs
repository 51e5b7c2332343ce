//! Retry policy registry
//!
//! Different remote APIs (and different resource types on the same API) need
//! different retry budgets. The registry maps resource type names to
//! [`RetryPolicy`] values so call sites ask for "the policy for
//! `aws_waf_regex_match_set`" instead of hard-coding constants.
//!
//! ## Usage
//!
//! ```rust
//! use changetoken_core::{PolicyRegistry, RetryPolicy};
//! use changetoken_core::policy::Backoff;
//! use std::time::Duration;
//!
//! let registry = PolicyRegistry::new();
//! registry.register_policy(
//!     "aws_waf_regex_match_set",
//!     RetryPolicy::new(Duration::from_secs(300), Backoff::Fixed(Duration::from_secs(1))),
//! );
//!
//! let policy = registry.policy_for("aws_waf_regex_match_set");
//! assert_eq!(policy.max_elapsed(), Duration::from_secs(300));
//! ```
//!
//! ## Registration
//!
//! Adapter crates register their defaults during initialization; values from
//! configuration are applied afterwards and win.

use crate::config::RetryPoliciesConfig;
use crate::error::Result;
use crate::policy::RetryPolicy;
use std::collections::HashMap;
use std::sync::RwLock;

/// Registry of retry policies keyed by resource type
///
/// ## Thread Safety
///
/// The registry uses interior mutability with RwLock, allowing concurrent
/// reads and exclusive writes.
#[derive(Debug, Default)]
pub struct PolicyRegistry {
    /// Policy for unregistered resource types
    default: RwLock<RetryPolicy>,

    /// Registered policies
    policies: RwLock<HashMap<String, RetryPolicy>>,
}

impl PolicyRegistry {
    /// Create a registry holding only the default policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configuration
    pub fn from_config(config: &RetryPoliciesConfig) -> Result<Self> {
        let registry = Self::new();
        registry.apply_config(config)?;
        Ok(registry)
    }

    /// Apply configuration on top of what is registered
    ///
    /// The configured default replaces the current default; each configured
    /// resource type replaces its registered policy.
    pub fn apply_config(&self, config: &RetryPoliciesConfig) -> Result<()> {
        config.validate()?;

        let default = RetryPolicy::from_config(&config.default)?;
        let mut overrides = HashMap::with_capacity(config.resources.len());
        for (name, resource_config) in &config.resources {
            overrides.insert(name.clone(), RetryPolicy::from_config(resource_config)?);
        }

        *self.default.write().unwrap() = default;
        self.policies.write().unwrap().extend(overrides);
        Ok(())
    }

    /// Register a policy for a resource type
    ///
    /// # Parameters
    ///
    /// - `name`: Resource type name (e.g., "aws_waf_regex_pattern_set")
    /// - `policy`: Policy used for that resource type's mutations
    pub fn register_policy(&self, name: impl Into<String>, policy: RetryPolicy) {
        let name = name.into();
        let mut policies = self.policies.write().unwrap();
        policies.insert(name, policy);
    }

    /// Replace the default policy
    pub fn set_default(&self, policy: RetryPolicy) {
        *self.default.write().unwrap() = policy;
    }

    /// Policy for a resource type, falling back to the default
    pub fn policy_for(&self, name: &str) -> RetryPolicy {
        let policies = self.policies.read().unwrap();
        match policies.get(name) {
            Some(policy) => policy.clone(),
            None => {
                tracing::debug!("No retry policy registered for {}, using default", name);
                self.default.read().unwrap().clone()
            }
        }
    }

    /// The default policy
    pub fn default_policy(&self) -> RetryPolicy {
        self.default.read().unwrap().clone()
    }

    /// List all registered resource types
    pub fn list_policies(&self) -> Vec<String> {
        let policies = self.policies.read().unwrap();
        let mut names: Vec<String> = policies.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check if a resource type has its own policy
    pub fn has_policy(&self, name: &str) -> bool {
        let policies = self.policies.read().unwrap();
        policies.contains_key(name)
    }
}
