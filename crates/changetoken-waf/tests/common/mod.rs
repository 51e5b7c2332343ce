//! In-memory WAF Classic double
//!
//! Enforces the rules the real API enforces for the calls this crate makes:
//! - only the most recently issued, unused change token is accepted
//! - INSERT of a present element and DELETE of an absent one are rejected
//! - non-empty sets and referenced pattern sets cannot be deleted
//!
//! Failures can be injected per operation name ("UpdateRegexMatchSet", ...).

#![allow(dead_code)]

use async_trait::async_trait;
use changetoken_core::policy::Backoff;
use changetoken_core::{ChangeToken, ChangeTokenSource, Error, PolicyRegistry, Result, RetryPolicy};
use changetoken_waf::types::{
    ChangeAction, RegexMatchSet, RegexMatchSetUpdate, RegexMatchTuple, RegexPatternSet,
    RegexPatternSetUpdate,
};
use changetoken_waf::{WafApi, regex_match_set, regex_pattern_set};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeState {
    next_token: usize,
    current_token: Option<String>,
    used_tokens: Vec<String>,

    next_id: usize,
    pattern_sets: BTreeMap<String, (String, Vec<String>)>,
    match_sets: BTreeMap<String, (String, Vec<RegexMatchTuple>)>,

    /// Remaining lookups for which a set still reads as missing
    hidden: HashMap<String, usize>,
    hide_new_sets_for: usize,

    injected: HashMap<&'static str, VecDeque<Error>>,
    calls: HashMap<&'static str, usize>,
}

impl FakeState {
    fn record(&mut self, op: &'static str) -> Result<()> {
        *self.calls.entry(op).or_default() += 1;
        match self.injected.get_mut(op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn consume(&mut self, token: ChangeToken) -> Result<()> {
        let token = token.into_inner();
        if self.current_token.as_deref() != Some(token.as_str()) {
            return Err(Error::stale_token(
                "The change token you provided has already been used",
            ));
        }
        self.current_token = None;
        self.used_tokens.push(token);
        Ok(())
    }

    fn new_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        let id = format!("{}-{:04}", prefix, self.next_id);
        if self.hide_new_sets_for > 0 {
            self.hidden.insert(id.clone(), self.hide_new_sets_for);
        }
        id
    }

    /// Whether `id` is still invisible; counts down one lookup
    fn still_hidden(&mut self, id: &str) -> bool {
        match self.hidden.get_mut(id) {
            Some(0) | None => false,
            Some(remaining) => {
                *remaining -= 1;
                true
            }
        }
    }

    fn missing(id: &str) -> Error {
        Error::not_found(format!("The referenced item {} does not exist", id))
    }

    fn pattern_set_referenced(&self, id: &str) -> bool {
        self.match_sets
            .values()
            .any(|(_, tuples)| tuples.iter().any(|t| t.regex_pattern_set_id == id))
    }
}

/// WAF Classic double
#[derive(Clone, Default)]
pub struct FakeWaf {
    state: Arc<Mutex<FakeState>>,
}

impl FakeWaf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next calls of `op` with `errors`, in order
    pub fn inject(&self, op: &'static str, errors: Vec<Error>) {
        self.state
            .lock()
            .unwrap()
            .injected
            .entry(op)
            .or_default()
            .extend(errors);
    }

    /// Sets created from now on read as missing for their first `n` lookups
    pub fn hide_new_sets_for(&self, n: usize) {
        self.state.lock().unwrap().hide_new_sets_for = n;
    }

    /// Number of calls to `op`, including failed ones
    pub fn calls(&self, op: &str) -> usize {
        self.state.lock().unwrap().calls.get(op).copied().unwrap_or(0)
    }

    /// Tokens accepted so far, in order
    pub fn used_tokens(&self) -> Vec<String> {
        self.state.lock().unwrap().used_tokens.clone()
    }

    /// Seed a pattern set directly; returns its id
    pub fn seed_pattern_set(&self, name: &str, patterns: &[&str]) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.new_id("rps");
        state.hidden.remove(&id);
        state.pattern_sets.insert(
            id.clone(),
            (name.to_string(), patterns.iter().map(|p| p.to_string()).collect()),
        );
        id
    }

    /// Seed a match set directly; returns its id
    pub fn seed_match_set(&self, name: &str, tuples: Vec<RegexMatchTuple>) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.new_id("rms");
        state.hidden.remove(&id);
        state.match_sets.insert(id.clone(), (name.to_string(), tuples));
        id
    }

    pub fn pattern_set_exists(&self, id: &str) -> bool {
        self.state.lock().unwrap().pattern_sets.contains_key(id)
    }

    pub fn match_set_exists(&self, id: &str) -> bool {
        self.state.lock().unwrap().match_sets.contains_key(id)
    }

    /// Stored patterns of a set, sorted
    pub fn patterns(&self, id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut patterns = state
            .pattern_sets
            .get(id)
            .map(|(_, p)| p.clone())
            .unwrap_or_default();
        patterns.sort();
        patterns
    }

    /// Stored tuples of a set, sorted
    pub fn tuples(&self, id: &str) -> Vec<RegexMatchTuple> {
        let state = self.state.lock().unwrap();
        let mut tuples = state
            .match_sets
            .get(id)
            .map(|(_, t)| t.clone())
            .unwrap_or_default();
        tuples.sort();
        tuples
    }
}

#[async_trait]
impl ChangeTokenSource for FakeWaf {
    async fn fetch_change_token(&self) -> Result<ChangeToken> {
        let mut state = self.state.lock().unwrap();
        state.record("GetChangeToken")?;
        let token = format!("token-{:04}", state.next_token);
        state.next_token += 1;
        state.current_token = Some(token.clone());
        Ok(ChangeToken::new(token))
    }

    fn source_name(&self) -> &'static str {
        "fake-waf"
    }
}

#[async_trait]
impl WafApi for FakeWaf {
    async fn create_regex_pattern_set(&self, name: &str, token: ChangeToken) -> Result<RegexPatternSet> {
        let mut state = self.state.lock().unwrap();
        state.record("CreateRegexPatternSet")?;
        state.consume(token)?;

        let id = state.new_id("rps");
        state.pattern_sets.insert(id.clone(), (name.to_string(), Vec::new()));
        Ok(RegexPatternSet {
            id,
            name: name.to_string(),
            regex_pattern_strings: Vec::new(),
        })
    }

    async fn get_regex_pattern_set(&self, id: &str) -> Result<RegexPatternSet> {
        let mut state = self.state.lock().unwrap();
        state.record("GetRegexPatternSet")?;
        if state.still_hidden(id) {
            return Err(FakeState::missing(id));
        }

        let (name, patterns) = state
            .pattern_sets
            .get(id)
            .cloned()
            .ok_or_else(|| FakeState::missing(id))?;
        Ok(RegexPatternSet {
            id: id.to_string(),
            name,
            regex_pattern_strings: patterns,
        })
    }

    async fn update_regex_pattern_set(
        &self,
        id: &str,
        updates: &[RegexPatternSetUpdate],
        token: ChangeToken,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record("UpdateRegexPatternSet")?;
        state.consume(token)?;
        if state.still_hidden(id) {
            return Err(FakeState::missing(id));
        }

        let (_, patterns) = state
            .pattern_sets
            .get(id)
            .cloned()
            .ok_or_else(|| FakeState::missing(id))?;

        let mut next = patterns;
        for update in updates {
            let present = next.contains(&update.regex_pattern_string);
            match (update.action, present) {
                (ChangeAction::Insert, false) => next.push(update.regex_pattern_string.clone()),
                (ChangeAction::Delete, true) => next.retain(|p| p != &update.regex_pattern_string),
                (action, _) => {
                    return Err(Error::invalid_input(format!(
                        "cannot {} pattern '{}'",
                        action, update.regex_pattern_string
                    )));
                }
            }
        }

        if let Some(entry) = state.pattern_sets.get_mut(id) {
            entry.1 = next;
        }
        Ok(())
    }

    async fn delete_regex_pattern_set(&self, id: &str, token: ChangeToken) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record("DeleteRegexPatternSet")?;
        state.consume(token)?;

        let (_, patterns) = state
            .pattern_sets
            .get(id)
            .ok_or_else(|| FakeState::missing(id))?;
        if !patterns.is_empty() {
            return Err(Error::in_use(format!("regex pattern set {} is not empty", id)));
        }
        if state.pattern_set_referenced(id) {
            return Err(Error::in_use(format!("regex pattern set {} is referenced", id)));
        }

        state.pattern_sets.remove(id);
        Ok(())
    }

    async fn create_regex_match_set(&self, name: &str, token: ChangeToken) -> Result<RegexMatchSet> {
        let mut state = self.state.lock().unwrap();
        state.record("CreateRegexMatchSet")?;
        state.consume(token)?;

        let id = state.new_id("rms");
        state.match_sets.insert(id.clone(), (name.to_string(), Vec::new()));
        Ok(RegexMatchSet {
            id,
            name: name.to_string(),
            regex_match_tuples: Vec::new(),
        })
    }

    async fn get_regex_match_set(&self, id: &str) -> Result<RegexMatchSet> {
        let mut state = self.state.lock().unwrap();
        state.record("GetRegexMatchSet")?;
        if state.still_hidden(id) {
            return Err(FakeState::missing(id));
        }

        let (name, tuples) = state
            .match_sets
            .get(id)
            .cloned()
            .ok_or_else(|| FakeState::missing(id))?;
        Ok(RegexMatchSet {
            id: id.to_string(),
            name,
            regex_match_tuples: tuples,
        })
    }

    async fn update_regex_match_set(
        &self,
        id: &str,
        updates: &[RegexMatchSetUpdate],
        token: ChangeToken,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record("UpdateRegexMatchSet")?;
        state.consume(token)?;
        if state.still_hidden(id) {
            return Err(FakeState::missing(id));
        }

        let (_, tuples) = state
            .match_sets
            .get(id)
            .cloned()
            .ok_or_else(|| FakeState::missing(id))?;

        let mut next = tuples;
        for update in updates {
            let tuple = &update.regex_match_tuple;
            if update.action == ChangeAction::Insert
                && !state.pattern_sets.contains_key(&tuple.regex_pattern_set_id)
            {
                return Err(FakeState::missing(&tuple.regex_pattern_set_id));
            }

            let present = next.contains(tuple);
            match (update.action, present) {
                (ChangeAction::Insert, false) => next.push(tuple.clone()),
                (ChangeAction::Delete, true) => next.retain(|t| t != tuple),
                (action, _) => {
                    return Err(Error::invalid_input(format!(
                        "cannot {} tuple on {}",
                        action, tuple.field_to_match
                    )));
                }
            }
        }

        if let Some(entry) = state.match_sets.get_mut(id) {
            entry.1 = next;
        }
        Ok(())
    }

    async fn delete_regex_match_set(&self, id: &str, token: ChangeToken) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.record("DeleteRegexMatchSet")?;
        state.consume(token)?;

        let (_, tuples) = state
            .match_sets
            .get(id)
            .ok_or_else(|| FakeState::missing(id))?;
        if !tuples.is_empty() {
            return Err(Error::in_use(format!("regex match set {} is not empty", id)));
        }

        state.match_sets.remove(id);
        Ok(())
    }
}

/// Registry with immediate retries for both resource types
pub fn immediate_registry() -> Arc<PolicyRegistry> {
    let registry = PolicyRegistry::new();
    let policy = RetryPolicy::new(Duration::from_secs(30), Backoff::Fixed(Duration::ZERO));
    registry.register_policy(regex_pattern_set::RESOURCE_TYPE, policy.clone());
    registry.register_policy(regex_match_set::RESOURCE_TYPE, policy);
    Arc::new(registry)
}

/// Assert no accepted token was accepted twice
pub fn assert_tokens_unique(waf: &FakeWaf) {
    let used = waf.used_tokens();
    let unique: HashSet<&String> = used.iter().collect();
    assert_eq!(unique.len(), used.len(), "a change token was accepted twice");
}
