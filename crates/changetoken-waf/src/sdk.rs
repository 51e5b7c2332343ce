// # AWS SDK WAF Client
//
// `WafApi` over `aws-sdk-waf`. One SDK request per call; failures are
// classified by error code into `changetoken_core::Error`.
//
// ## Security Requirements
//
// - Change tokens never appear in logs (`ChangeToken` redacts its Debug)
// - Credentials come from the standard AWS provider chain only
//
// ## API Reference
//
// - WAF Classic: https://docs.aws.amazon.com/waf/latest/APIReference/API_Operations_AWS_WAF.html
// - WAF Classic is a global service served from `us-east-1`

use crate::api::WafApi;
use crate::error::{PROVIDER, classify_waf_error};
use crate::types::{
    FieldToMatch, MatchFieldType, RegexMatchSet, RegexMatchSetUpdate, RegexMatchTuple,
    RegexPatternSet, RegexPatternSetUpdate, TextTransformation,
};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_waf::Client;
use aws_sdk_waf::error::{BuildError, DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_waf::types as sdk;
use changetoken_core::{ChangeToken, ChangeTokenSource, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Region WAF Classic is served from
pub const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for [`SdkWafClient`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WafClientConfig {
    /// AWS region (defaults to `us-east-1`)
    #[serde(default)]
    pub region: Option<String>,

    /// Endpoint override, e.g. a local emulator
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

/// WAF Classic client backed by the AWS SDK
#[derive(Debug, Clone)]
pub struct SdkWafClient {
    client: Client,
}

impl SdkWafClient {
    /// Wrap an existing SDK client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Build a client from the default AWS configuration chain
    pub async fn connect(config: &WafClientConfig) -> Self {
        let region = config
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let mut loader = aws_config::defaults(BehaviorVersion::latest()).region(Region::new(region));
        if let Some(endpoint_url) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint_url);
        }

        let sdk_config = loader.load().await;
        Self::from_client(Client::new(&sdk_config))
    }
}

/// Classify an SDK failure
fn sdk_error<E, R>(err: SdkError<E, R>) -> Error
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let detail = DisplayErrorContext(&err).to_string();
    classify_waf_error(
        ProvideErrorMetadata::code(&err),
        ProvideErrorMetadata::message(&err),
        &detail,
    )
}

fn build_error(err: BuildError) -> Error {
    Error::invalid_input(err.to_string())
}

fn missing(what: &str) -> Error {
    Error::provider(PROVIDER, format!("response is missing {}", what))
}

fn pattern_set_from_sdk(set: sdk::RegexPatternSet) -> Result<RegexPatternSet> {
    let id: Option<String> = set.regex_pattern_set_id.into();
    let name: Option<String> = set.name.into();
    let patterns: Option<Vec<String>> = set.regex_pattern_strings.into();

    Ok(RegexPatternSet {
        id: id.ok_or_else(|| missing("RegexPatternSetId"))?,
        name: name.unwrap_or_default(),
        regex_pattern_strings: patterns.unwrap_or_default(),
    })
}

fn match_set_from_sdk(set: sdk::RegexMatchSet) -> Result<RegexMatchSet> {
    let id: Option<String> = set.regex_match_set_id.into();
    let name: Option<String> = set.name.into();
    let tuples: Option<Vec<sdk::RegexMatchTuple>> = set.regex_match_tuples.into();

    Ok(RegexMatchSet {
        id: id.ok_or_else(|| missing("RegexMatchSetId"))?,
        name: name.unwrap_or_default(),
        regex_match_tuples: tuples
            .unwrap_or_default()
            .into_iter()
            .map(tuple_from_sdk)
            .collect::<Result<_>>()?,
    })
}

fn tuple_from_sdk(tuple: sdk::RegexMatchTuple) -> Result<RegexMatchTuple> {
    let field: Option<sdk::FieldToMatch> = tuple.field_to_match.into();
    let field = field.ok_or_else(|| missing("FieldToMatch"))?;

    let field_type: Option<sdk::MatchFieldType> = field.r#type.into();
    let field_type = field_type
        .ok_or_else(|| missing("FieldToMatch.Type"))?
        .as_str()
        .parse::<MatchFieldType>()?;
    let data: Option<String> = field.data.into();

    let transformation: Option<sdk::TextTransformation> = tuple.text_transformation.into();
    let transformation = transformation
        .ok_or_else(|| missing("TextTransformation"))?
        .as_str()
        .parse::<TextTransformation>()?;

    let pattern_set_id: Option<String> = tuple.regex_pattern_set_id.into();

    Ok(RegexMatchTuple::new(
        FieldToMatch::new(field_type, data),
        transformation,
        pattern_set_id.ok_or_else(|| missing("RegexPatternSetId"))?,
    ))
}

fn tuple_to_sdk(tuple: &RegexMatchTuple) -> Result<sdk::RegexMatchTuple> {
    let field = sdk::FieldToMatch::builder()
        .r#type(sdk::MatchFieldType::from(tuple.field_to_match.field_type.as_str()))
        .set_data(tuple.field_to_match.data.clone())
        .build()
        .map_err(build_error)?;

    sdk::RegexMatchTuple::builder()
        .field_to_match(field)
        .text_transformation(sdk::TextTransformation::from(tuple.text_transformation.as_str()))
        .regex_pattern_set_id(&tuple.regex_pattern_set_id)
        .build()
        .map_err(build_error)
}

fn pattern_updates_to_sdk(updates: &[RegexPatternSetUpdate]) -> Result<Vec<sdk::RegexPatternSetUpdate>> {
    updates
        .iter()
        .map(|update| {
            sdk::RegexPatternSetUpdate::builder()
                .action(sdk::ChangeAction::from(update.action.as_str()))
                .regex_pattern_string(&update.regex_pattern_string)
                .build()
                .map_err(build_error)
        })
        .collect()
}

fn match_updates_to_sdk(updates: &[RegexMatchSetUpdate]) -> Result<Vec<sdk::RegexMatchSetUpdate>> {
    updates
        .iter()
        .map(|update| {
            sdk::RegexMatchSetUpdate::builder()
                .action(sdk::ChangeAction::from(update.action.as_str()))
                .regex_match_tuple(tuple_to_sdk(&update.regex_match_tuple)?)
                .build()
                .map_err(build_error)
        })
        .collect()
}

#[async_trait]
impl ChangeTokenSource for SdkWafClient {
    async fn fetch_change_token(&self) -> Result<ChangeToken> {
        let output = self.client.get_change_token().send().await.map_err(sdk_error)?;
        let token: Option<String> = output.change_token.into();
        token.map(ChangeToken::new).ok_or_else(|| missing("ChangeToken"))
    }

    fn source_name(&self) -> &'static str {
        "aws-waf"
    }
}

#[async_trait]
impl WafApi for SdkWafClient {
    async fn create_regex_pattern_set(&self, name: &str, token: ChangeToken) -> Result<RegexPatternSet> {
        debug!("CreateRegexPatternSet name={}", name);
        let output = self
            .client
            .create_regex_pattern_set()
            .name(name)
            .change_token(token.into_inner())
            .send()
            .await
            .map_err(sdk_error)?;

        let set: Option<sdk::RegexPatternSet> = output.regex_pattern_set.into();
        pattern_set_from_sdk(set.ok_or_else(|| missing("RegexPatternSet"))?)
    }

    async fn get_regex_pattern_set(&self, id: &str) -> Result<RegexPatternSet> {
        debug!("GetRegexPatternSet id={}", id);
        let output = self
            .client
            .get_regex_pattern_set()
            .regex_pattern_set_id(id)
            .send()
            .await
            .map_err(sdk_error)?;

        let set: Option<sdk::RegexPatternSet> = output.regex_pattern_set.into();
        pattern_set_from_sdk(set.ok_or_else(|| missing("RegexPatternSet"))?)
    }

    async fn update_regex_pattern_set(
        &self,
        id: &str,
        updates: &[RegexPatternSetUpdate],
        token: ChangeToken,
    ) -> Result<()> {
        debug!("UpdateRegexPatternSet id={} updates={}", id, updates.len());
        self.client
            .update_regex_pattern_set()
            .regex_pattern_set_id(id)
            .set_updates(Some(pattern_updates_to_sdk(updates)?))
            .change_token(token.into_inner())
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn delete_regex_pattern_set(&self, id: &str, token: ChangeToken) -> Result<()> {
        debug!("DeleteRegexPatternSet id={}", id);
        self.client
            .delete_regex_pattern_set()
            .regex_pattern_set_id(id)
            .change_token(token.into_inner())
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn create_regex_match_set(&self, name: &str, token: ChangeToken) -> Result<RegexMatchSet> {
        debug!("CreateRegexMatchSet name={}", name);
        let output = self
            .client
            .create_regex_match_set()
            .name(name)
            .change_token(token.into_inner())
            .send()
            .await
            .map_err(sdk_error)?;

        let set: Option<sdk::RegexMatchSet> = output.regex_match_set.into();
        match_set_from_sdk(set.ok_or_else(|| missing("RegexMatchSet"))?)
    }

    async fn get_regex_match_set(&self, id: &str) -> Result<RegexMatchSet> {
        debug!("GetRegexMatchSet id={}", id);
        let output = self
            .client
            .get_regex_match_set()
            .regex_match_set_id(id)
            .send()
            .await
            .map_err(sdk_error)?;

        let set: Option<sdk::RegexMatchSet> = output.regex_match_set.into();
        match_set_from_sdk(set.ok_or_else(|| missing("RegexMatchSet"))?)
    }

    async fn update_regex_match_set(
        &self,
        id: &str,
        updates: &[RegexMatchSetUpdate],
        token: ChangeToken,
    ) -> Result<()> {
        debug!("UpdateRegexMatchSet id={} updates={}", id, updates.len());
        self.client
            .update_regex_match_set()
            .regex_match_set_id(id)
            .set_updates(Some(match_updates_to_sdk(updates)?))
            .change_token(token.into_inner())
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }

    async fn delete_regex_match_set(&self, id: &str, token: ChangeToken) -> Result<()> {
        debug!("DeleteRegexMatchSet id={}", id);
        self.client
            .delete_regex_match_set()
            .regex_match_set_id(id)
            .change_token(token.into_inner())
            .send()
            .await
            .map_err(sdk_error)?;
        Ok(())
    }
}
