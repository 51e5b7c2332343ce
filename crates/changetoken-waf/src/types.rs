//! WAF Classic regex set model
//!
//! Provider-neutral mirrors of the WAF Classic shapes this crate manages.
//! String forms (`as_str` / `FromStr`) match the API's enum values exactly.

use changetoken_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum length of a WAF Classic resource name
pub const MAX_NAME_LEN: usize = 128;

macro_rules! api_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($(#[$vmeta:meta])* $variant:ident => $text:literal,)+ }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            /// Every value, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The API's string form
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(Error::invalid_input(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}

api_enum! {
    /// Whether an update adds or removes an element
    pub enum ChangeAction {
        Insert => "INSERT",
        Delete => "DELETE",
    }
}

api_enum! {
    /// Part of a web request to inspect
    pub enum MatchFieldType {
        Uri => "URI",
        QueryString => "QUERY_STRING",
        /// Requires `data` naming the header
        Header => "HEADER",
        Method => "METHOD",
        Body => "BODY",
        /// Requires `data` naming the argument
        SingleQueryArg => "SINGLE_QUERY_ARG",
        AllQueryArgs => "ALL_QUERY_ARGS",
    }
}

api_enum! {
    /// Transformation applied before matching
    pub enum TextTransformation {
        None => "NONE",
        CompressWhiteSpace => "COMPRESS_WHITE_SPACE",
        HtmlEntityDecode => "HTML_ENTITY_DECODE",
        Lowercase => "LOWERCASE",
        CmdLine => "CMD_LINE",
        UrlDecode => "URL_DECODE",
    }
}

impl MatchFieldType {
    /// Whether this field type names a specific header or argument
    pub fn requires_data(&self) -> bool {
        matches!(self, MatchFieldType::Header | MatchFieldType::SingleQueryArg)
    }
}

/// The part of a request a tuple inspects
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldToMatch {
    #[serde(rename = "type")]
    pub field_type: MatchFieldType,

    /// Header or argument name; stored lower case
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lowercase_data"
    )]
    pub data: Option<String>,
}

impl FieldToMatch {
    /// Create a field, lower-casing `data`
    ///
    /// WAF treats header and argument names case-insensitively and reports
    /// them back lower case, so they are normalised on the way in.
    pub fn new(field_type: MatchFieldType, data: Option<impl Into<String>>) -> Self {
        Self {
            field_type,
            data: data.map(|d| d.into().to_lowercase()),
        }
    }

    /// Shorthand for a `HEADER` field
    pub fn header(name: impl Into<String>) -> Self {
        Self::new(MatchFieldType::Header, Some(name))
    }

    /// Check `data` is present exactly when the field type needs it
    pub fn validate(&self) -> Result<()> {
        match (&self.data, self.field_type.requires_data()) {
            (None, true) => Err(Error::invalid_input(format!(
                "field type {} requires data",
                self.field_type
            ))),
            (Some(data), true) if data.is_empty() => Err(Error::invalid_input(format!(
                "field type {} requires non-empty data",
                self.field_type
            ))),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for FieldToMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.data {
            Some(data) => write!(f, "{}:{}", self.field_type, data),
            None => write!(f, "{}", self.field_type),
        }
    }
}

/// One inspection rule of a regex match set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegexMatchTuple {
    pub field_to_match: FieldToMatch,
    pub text_transformation: TextTransformation,
    pub regex_pattern_set_id: String,
}

impl RegexMatchTuple {
    pub fn new(
        field_to_match: FieldToMatch,
        text_transformation: TextTransformation,
        regex_pattern_set_id: impl Into<String>,
    ) -> Self {
        Self {
            field_to_match,
            text_transformation,
            regex_pattern_set_id: regex_pattern_set_id.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.field_to_match.validate()?;
        if self.regex_pattern_set_id.is_empty() {
            return Err(Error::invalid_input("regex_pattern_set_id cannot be empty"));
        }
        Ok(())
    }
}

/// A regex pattern set as stored remotely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexPatternSet {
    pub id: String,
    pub name: String,
    pub regex_pattern_strings: Vec<String>,
}

/// A regex match set as stored remotely
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexMatchSet {
    pub id: String,
    pub name: String,
    pub regex_match_tuples: Vec<RegexMatchTuple>,
}

/// Desired state of a regex pattern set
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegexPatternSetSpec {
    pub name: String,

    #[serde(default)]
    pub regex_pattern_strings: Vec<String>,
}

impl RegexPatternSetSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            regex_pattern_strings: Vec::new(),
        }
    }

    /// Add a pattern string
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.regex_pattern_strings.push(pattern.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        if self.regex_pattern_strings.iter().any(String::is_empty) {
            return Err(Error::invalid_input("regex pattern strings cannot be empty"));
        }
        Ok(())
    }
}

/// Desired state of a regex match set
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RegexMatchSetSpec {
    pub name: String,

    #[serde(default)]
    pub regex_match_tuples: Vec<RegexMatchTuple>,
}

impl RegexMatchSetSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            regex_match_tuples: Vec::new(),
        }
    }

    /// Add a match tuple
    pub fn with_tuple(mut self, tuple: RegexMatchTuple) -> Self {
        self.regex_match_tuples.push(tuple);
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_name(&self.name)?;
        for tuple in &self.regex_match_tuples {
            tuple.validate()?;
        }
        Ok(())
    }
}

/// One element change of a regex pattern set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexPatternSetUpdate {
    pub action: ChangeAction,
    pub regex_pattern_string: String,
}

impl RegexPatternSetUpdate {
    pub fn insert(pattern: impl Into<String>) -> Self {
        Self {
            action: ChangeAction::Insert,
            regex_pattern_string: pattern.into(),
        }
    }

    pub fn delete(pattern: impl Into<String>) -> Self {
        Self {
            action: ChangeAction::Delete,
            regex_pattern_string: pattern.into(),
        }
    }
}

/// One element change of a regex match set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexMatchSetUpdate {
    pub action: ChangeAction,
    pub regex_match_tuple: RegexMatchTuple,
}

impl RegexMatchSetUpdate {
    pub fn insert(tuple: RegexMatchTuple) -> Self {
        Self {
            action: ChangeAction::Insert,
            regex_match_tuple: tuple,
        }
    }

    pub fn delete(tuple: RegexMatchTuple) -> Self {
        Self {
            action: ChangeAction::Delete,
            regex_match_tuple: tuple,
        }
    }
}

fn lowercase_data<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let data = Option::<String>::deserialize(deserializer)?;
    Ok(data.map(|d| d.to_lowercase()))
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::invalid_input("name cannot be empty"));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(Error::invalid_input(format!(
            "name exceeds {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(())
}
