//! Regex match set lifecycle
//!
//! Same shape as the pattern set lifecycle: each mutating call runs inside
//! `retry_with_token` with the policy registered for [`RESOURCE_TYPE`].
//! Tuples reference pattern sets by id; WAF rejects a tuple whose pattern set
//! does not exist.

use crate::api::WafApi;
use crate::diff::diff_match_tuples;
use crate::types::{
    ChangeAction, RegexMatchSet, RegexMatchSetSpec, RegexMatchSetUpdate, RegexMatchTuple,
};
use changetoken_core::{
    ChangeToken, ChangeTokenRetryer, Error, PolicyRegistry, Result, RetryContext, RetryEvent,
    RetryPolicy,
};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Registry key for regex match set policies
pub const RESOURCE_TYPE: &str = "aws_waf_regex_match_set";

/// Regex match set operations
pub struct RegexMatchSets<A> {
    api: Arc<A>,
    policies: Arc<PolicyRegistry>,
    event_tx: Option<mpsc::Sender<RetryEvent>>,
}

impl<A: WafApi> RegexMatchSets<A> {
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

    /// Create a set and insert its tuples
    ///
    /// The tuples are written by a second call, which retries while the new
    /// set is not visible yet. A tuple naming a pattern set that does not
    /// exist fails the call.
    pub async fn create(&self, ctx: &RetryContext, spec: &RegexMatchSetSpec) -> Result<RegexMatchSet> {
        spec.validate()?;
        let policy = self.policies.policy_for(RESOURCE_TYPE);

        let created = self
            .retryer(policy.clone())
            .retry_with_token(&ctx.child("CreateRegexMatchSet", &spec.name), |token| {
                self.api.create_regex_match_set(&spec.name, token)
            })
            .await?;
        info!("Created regex match set {} ({})", spec.name, created.id);

        let updates = diff_match_tuples(&created.regex_match_tuples, &spec.regex_match_tuples);
        if !updates.is_empty() {
            let result = self
                .retryer(policy)
                .retry_with_token(&ctx.child("UpdateRegexMatchSet", &created.id), |token| {
                    self.fill_new_set(&created.id, &updates, token)
                })
                .await;
            if let Err(e) = result {
                warn!(
                    "Regex match set {} was created but its tuples were not written: {}",
                    created.id, e
                );
                return Err(e);
            }
        }

        Ok(RegexMatchSet {
            regex_match_tuples: unique(&spec.regex_match_tuples),
            ..created
        })
    }

    /// Fetch a set; `None` if it does not exist
    pub async fn read(&self, id: &str) -> Result<Option<RegexMatchSet>> {
        match self.api.get_regex_match_set(id).await {
            Ok(set) => Ok(Some(set)),
            Err(e) if e.is_not_found() => {
                debug!("Regex match set {} not found", id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Converge a set's tuples to `desired`
    ///
    /// Issues no mutating call when nothing changes.
    pub async fn update(
        &self,
        ctx: &RetryContext,
        id: &str,
        desired: &[RegexMatchTuple],
    ) -> Result<RegexMatchSet> {
        for tuple in desired {
            tuple.validate()?;
        }

        let current = self
            .read(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("regex match set {}", id)))?;

        let updates = diff_match_tuples(&current.regex_match_tuples, desired);
        if updates.is_empty() {
            debug!("Regex match set {} already up to date", id);
            return Ok(current);
        }

        self.apply(ctx, id, &updates, self.policies.policy_for(RESOURCE_TYPE))
            .await?;
        info!("Updated regex match set {} ({} changes)", id, updates.len());

        Ok(RegexMatchSet {
            regex_match_tuples: unique(desired),
            ..current
        })
    }

    /// Empty and delete a set; a set that is already gone counts as deleted
    pub async fn delete(&self, ctx: &RetryContext, id: &str) -> Result<()> {
        let Some(current) = self.read(id).await? else {
            info!("Regex match set {} already deleted", id);
            return Ok(());
        };

        match self.remove(ctx, &current).await {
            Err(e) if e.is_not_found() => {
                info!("Regex match set {} disappeared during delete", id);
                Ok(())
            }
            other => other,
        }
    }

    /// Delete a set out of band, as drift would
    ///
    /// Deletes every tuple in one update, then deletes the set. A missing
    /// set is an error.
    pub async fn disappear(&self, ctx: &RetryContext, id: &str) -> Result<()> {
        let current = self
            .read(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("regex match set {}", id)))?;
        self.remove(ctx, &current).await
    }

    async fn remove(&self, ctx: &RetryContext, current: &RegexMatchSet) -> Result<()> {
        let policy = self.policies.policy_for(RESOURCE_TYPE);

        let clear = diff_match_tuples(&current.regex_match_tuples, &[]);
        if !clear.is_empty() {
            self.apply(ctx, &current.id, &clear, policy.clone()).await?;
        }

        self.retryer(policy)
            .retry_with_token(&ctx.child("DeleteRegexMatchSet", &current.id), |token| {
                self.api.delete_regex_match_set(&current.id, token)
            })
            .await?;
        info!("Deleted regex match set {} ({})", current.name, current.id);
        Ok(())
    }

    /// Write the tuples of a set created moments ago
    ///
    /// WAF answers `NotFound` both for a set that has not propagated yet and
    /// for a tuple whose pattern set does not exist. Only the first is
    /// retried, as `NotPropagated`.
    async fn fill_new_set(
        &self,
        id: &str,
        updates: &[RegexMatchSetUpdate],
        token: ChangeToken,
    ) -> Result<()> {
        let err = match self.api.update_regex_match_set(id, updates, token).await {
            Err(e) if e.is_not_found() => e,
            other => return other,
        };

        let referenced: HashSet<&str> = updates
            .iter()
            .filter(|u| u.action == ChangeAction::Insert)
            .map(|u| u.regex_match_tuple.regex_pattern_set_id.as_str())
            .collect();
        for pattern_set_id in referenced {
            match self.api.get_regex_pattern_set(pattern_set_id).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    debug!(
                        "Regex match set {} references missing pattern set {}",
                        id, pattern_set_id
                    );
                    return Err(err);
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::not_propagated(format!(
            "regex match set {} is not visible yet: {}",
            id, err
        )))
    }

    async fn apply(
        &self,
        ctx: &RetryContext,
        id: &str,
        updates: &[RegexMatchSetUpdate],
        policy: RetryPolicy,
    ) -> Result<()> {
        self.retryer(policy)
            .retry_with_token(&ctx.child("UpdateRegexMatchSet", id), |token| {
                self.api.update_regex_match_set(id, updates, token)
            })
            .await
    }
}

fn unique(tuples: &[RegexMatchTuple]) -> Vec<RegexMatchTuple> {
    let mut seen = HashSet::new();
    tuples.iter().filter(|t| seen.insert(*t)).cloned().collect()
}
