//! Regex pattern set lifecycle
//!
//! Every mutating call runs inside `retry_with_token` with the policy
//! registered for [`RESOURCE_TYPE`]. Reads go straight to the API.

use crate::api::WafApi;
use crate::diff::diff_pattern_strings;
use crate::types::{RegexPatternSet, RegexPatternSetSpec, RegexPatternSetUpdate};
use changetoken_core::{
    ChangeToken, ChangeTokenRetryer, Error, PolicyRegistry, Result, RetryContext, RetryEvent,
    RetryPolicy,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Registry key for regex pattern set policies
pub const RESOURCE_TYPE: &str = "aws_waf_regex_pattern_set";

/// Regex pattern set operations
pub struct RegexPatternSets<A> {
    api: Arc<A>,
    policies: Arc<PolicyRegistry>,
    event_tx: Option<mpsc::Sender<RetryEvent>>,
}

impl<A: WafApi> RegexPatternSets<A> {
    pub fn new(api: Arc<A>, policies: Arc<PolicyRegistry>) -> Self {
        Self {
            api,
            policies,
            event_tx: None,
        }
    }

    /// Forward retry events of every mutation into `tx`
    pub fn with_event_sender(mut self, tx: mpsc::Sender<RetryEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn retryer(&self, policy: RetryPolicy) -> ChangeTokenRetryer<Arc<A>> {
        let retryer = ChangeTokenRetryer::new(Arc::clone(&self.api)).with_policy(policy);
        match &self.event_tx {
            Some(tx) => retryer.with_event_sender(tx.clone()),
            None => retryer,
        }
    }

    /// Create a set and fill it with its patterns
    ///
    /// The contents are written by a second call. A new set can take a moment
    /// to become visible; until it does, that call fails with `NotFound`,
    /// which is retried as `NotPropagated`.
    pub async fn create(&self, ctx: &RetryContext, spec: &RegexPatternSetSpec) -> Result<RegexPatternSet> {
        spec.validate()?;
        let policy = self.policies.policy_for(RESOURCE_TYPE);

        let created = self
            .retryer(policy.clone())
            .retry_with_token(&ctx.child("CreateRegexPatternSet", &spec.name), |token| {
                self.api.create_regex_pattern_set(&spec.name, token)
            })
            .await?;
        info!("Created regex pattern set {} ({})", spec.name, created.id);

        let updates = diff_pattern_strings(&created.regex_pattern_strings, &spec.regex_pattern_strings);
        if !updates.is_empty() {
            let result = self
                .retryer(policy)
                .retry_with_token(&ctx.child("UpdateRegexPatternSet", &created.id), |token| {
                    self.fill_new_set(&created.id, &updates, token)
                })
                .await;
            if let Err(e) = result {
                warn!(
                    "Regex pattern set {} was created but its patterns were not written: {}",
                    created.id, e
                );
                return Err(e);
            }
        }

        Ok(RegexPatternSet {
            regex_pattern_strings: unique(&spec.regex_pattern_strings),
            ..created
        })
    }

    /// Fetch a set; `None` if it does not exist
    pub async fn read(&self, id: &str) -> Result<Option<RegexPatternSet>> {
        match self.api.get_regex_pattern_set(id).await {
            Ok(set) => Ok(Some(set)),
            Err(e) if e.is_not_found() => {
                debug!("Regex pattern set {} not found", id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Converge a set's patterns to `desired`
    ///
    /// Issues no mutating call when nothing changes.
    pub async fn update(&self, ctx: &RetryContext, id: &str, desired: &[String]) -> Result<RegexPatternSet> {
        if desired.iter().any(String::is_empty) {
            return Err(Error::invalid_input("regex pattern strings cannot be empty"));
        }

        let current = self
            .read(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("regex pattern set {}", id)))?;

        let updates = diff_pattern_strings(&current.regex_pattern_strings, desired);
        if updates.is_empty() {
            debug!("Regex pattern set {} already up to date", id);
            return Ok(current);
        }

        self.apply(ctx, id, &updates, self.policies.policy_for(RESOURCE_TYPE))
            .await?;
        info!("Updated regex pattern set {} ({} changes)", id, updates.len());

        Ok(RegexPatternSet {
            regex_pattern_strings: unique(desired),
            ..current
        })
    }

    /// Empty and delete a set; a set that is already gone counts as deleted
    pub async fn delete(&self, ctx: &RetryContext, id: &str) -> Result<()> {
        let Some(current) = self.read(id).await? else {
            info!("Regex pattern set {} already deleted", id);
            return Ok(());
        };

        match self.remove(ctx, &current).await {
            Err(e) if e.is_not_found() => {
                info!("Regex pattern set {} disappeared during delete", id);
                Ok(())
            }
            other => other,
        }
    }

    /// Delete a set out of band, as drift would
    ///
    /// Unlike [`RegexPatternSets::delete`], a missing set is an error.
    pub async fn disappear(&self, ctx: &RetryContext, id: &str) -> Result<()> {
        let current = self
            .read(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("regex pattern set {}", id)))?;
        self.remove(ctx, &current).await
    }

    async fn remove(&self, ctx: &RetryContext, current: &RegexPatternSet) -> Result<()> {
        let policy = self.policies.policy_for(RESOURCE_TYPE);

        let clear = diff_pattern_strings(&current.regex_pattern_strings, &[]);
        if !clear.is_empty() {
            self.apply(ctx, &current.id, &clear, policy.clone()).await?;
        }

        self.retryer(policy)
            .retry_with_token(&ctx.child("DeleteRegexPatternSet", &current.id), |token| {
                self.api.delete_regex_pattern_set(&current.id, token)
            })
            .await?;
        info!("Deleted regex pattern set {} ({})", current.name, current.id);
        Ok(())
    }

    /// Write the patterns of a set created moments ago
    ///
    /// Patterns reference nothing else, so `NotFound` can only mean the set
    /// has not propagated yet.
    async fn fill_new_set(
        &self,
        id: &str,
        updates: &[RegexPatternSetUpdate],
        token: ChangeToken,
    ) -> Result<()> {
        self.api
            .update_regex_pattern_set(id, updates, token)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    Error::not_propagated(format!("regex pattern set {} is not visible yet: {}", id, e))
                } else {
                    e
                }
            })
    }

    async fn apply(
        &self,
        ctx: &RetryContext,
        id: &str,
        updates: &[RegexPatternSetUpdate],
        policy: RetryPolicy,
    ) -> Result<()> {
        self.retryer(policy)
            .retry_with_token(&ctx.child("UpdateRegexPatternSet", id), |token| {
                self.api.update_regex_pattern_set(id, updates, token)
            })
            .await
    }
}

/// `items` without duplicates, first occurrence kept
fn unique(items: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    items.iter().filter(|i| seen.insert(*i)).cloned().collect()
}
