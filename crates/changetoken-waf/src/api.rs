// # WAF Classic API Trait
//
// The narrow slice of the WAF Classic API this crate drives. Mutating calls
// take the change token for the attempt by value; reads take none.
//
// ## Implementations
//
// - `SdkWafClient`: aws-sdk-waf (`sdk.rs`)
// - In-memory fake: `tests/common/mod.rs`

use crate::types::{RegexMatchSet, RegexMatchSetUpdate, RegexPatternSet, RegexPatternSetUpdate};
use async_trait::async_trait;
use changetoken_core::{ChangeToken, ChangeTokenSource, Result};

/// WAF Classic regex set operations
///
/// # Trust Level: Untrusted
///
/// Implementations are single-shot API adapters:
/// - ✅ One remote request per call
/// - ✅ Classify every failure into a [`changetoken_core::Error`] variant
/// - ❌ Retry, back off or fetch tokens on their own (owned by the retryer)
///
/// Token fetching (`GetChangeToken`) comes from the [`ChangeTokenSource`]
/// supertrait.
#[async_trait]
pub trait WafApi: ChangeTokenSource {
    /// `CreateRegexPatternSet`; the new set is empty
    async fn create_regex_pattern_set(&self, name: &str, token: ChangeToken) -> Result<RegexPatternSet>;

    /// `GetRegexPatternSet`; `Error::NotFound` if absent
    async fn get_regex_pattern_set(&self, id: &str) -> Result<RegexPatternSet>;

    /// `UpdateRegexPatternSet`
    async fn update_regex_pattern_set(
        &self,
        id: &str,
        updates: &[RegexPatternSetUpdate],
        token: ChangeToken,
    ) -> Result<()>;

    /// `DeleteRegexPatternSet`; the set must be empty
    async fn delete_regex_pattern_set(&self, id: &str, token: ChangeToken) -> Result<()>;

    /// `CreateRegexMatchSet`; the new set is empty
    async fn create_regex_match_set(&self, name: &str, token: ChangeToken) -> Result<RegexMatchSet>;

    /// `GetRegexMatchSet`; `Error::NotFound` if absent
    async fn get_regex_match_set(&self, id: &str) -> Result<RegexMatchSet>;

    /// `UpdateRegexMatchSet`
    async fn update_regex_match_set(
        &self,
        id: &str,
        updates: &[RegexMatchSetUpdate],
        token: ChangeToken,
    ) -> Result<()>;

    /// `DeleteRegexMatchSet`; the set must be empty
    async fn delete_regex_match_set(&self, id: &str, token: ChangeToken) -> Result<()>;
}
