// # changetoken-waf
//
// AWS WAF Classic regex pattern sets and regex match sets, with every
// mutation serialized through `changetoken_core::ChangeTokenRetryer`.
//
// ## Layout
//
// - `api`: `WafApi` trait (the API surface this crate needs)
// - `sdk`: `SdkWafClient`, the aws-sdk-waf implementation
// - `error`: WAF error code classification
// - `types`: regex set model
// - `diff`: INSERT / DELETE update computation
// - `regex_pattern_set`, `regex_match_set`: create / read / update / delete
//
// ## Usage
//
// ```rust,ignore
// let registry = Arc::new(PolicyRegistry::new());
// changetoken_waf::register(&registry);
//
// let client = Arc::new(SdkWafClient::connect(&WafClientConfig::default()).await);
// let sets = RegexPatternSets::new(client, registry);
// let set = sets
//     .create(&RetryContext::new(), &RegexPatternSetSpec::new("blocked").with_pattern("^/admin"))
//     .await?;
// ```

pub mod api;
pub mod diff;
pub mod error;
pub mod regex_match_set;
pub mod regex_pattern_set;
pub mod sdk;
pub mod types;

pub use api::WafApi;
pub use diff::{diff_match_tuples, diff_pattern_strings};
pub use error::classify_waf_error;
pub use regex_match_set::RegexMatchSets;
pub use regex_pattern_set::RegexPatternSets;
pub use sdk::{SdkWafClient, WafClientConfig};
pub use types::{
    ChangeAction, FieldToMatch, MatchFieldType, RegexMatchSet, RegexMatchSetSpec,
    RegexMatchSetUpdate, RegexMatchTuple, RegexPatternSet, RegexPatternSetSpec,
    RegexPatternSetUpdate, TextTransformation,
};

use changetoken_core::{PolicyRegistry, RetryPolicy};

/// Jitter for WAF mutations; spreads out writers that collided on a token
const WAF_JITTER: f64 = 0.2;

/// Register default retry policies for the WAF resource types
///
/// Call before applying configuration so configured values win.
pub fn register(registry: &PolicyRegistry) {
    let policy = RetryPolicy::default().with_jitter(WAF_JITTER);
    registry.register_policy(regex_pattern_set::RESOURCE_TYPE, policy.clone());
    registry.register_policy(regex_match_set::RESOURCE_TYPE, policy);
}
