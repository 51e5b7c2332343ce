//! WAF error classification
//!
//! Maps WAF Classic error codes (from `ProvideErrorMetadata::code()`) onto
//! the closed [`changetoken_core::Error`] taxonomy. The retryer only ever
//! sees the classified kind.

use changetoken_core::Error;

/// Provider label used in `Error::Provider`
pub const PROVIDER: &str = "waf";

/// The token was already used or superseded
const STALE_TOKEN_CODES: &[&str] = &["WAFStaleDataException"];

/// The addressed set does not exist
const NOT_FOUND_CODES: &[&str] = &["WAFNonexistentItemException"];

/// The parent container is not visible yet (eventual consistency)
const NOT_PROPAGATED_CODES: &[&str] = &["WAFNonexistentContainerException"];

/// Rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
];

/// The set is referenced elsewhere or still has contents
const IN_USE_CODES: &[&str] = &["WAFReferencedItemException", "WAFNonEmptyEntityException"];

const LIMIT_CODES: &[&str] = &["WAFLimitsExceededException"];

const INVALID_INPUT_CODES: &[&str] = &[
    "WAFInvalidParameterException",
    "WAFInvalidOperationException",
    "WAFDisallowedNameException",
    "WAFInvalidAccountException",
    "ValidationException",
];

const PERMISSION_CODES: &[&str] = &[
    "AccessDeniedException",
    "UnrecognizedClientException",
    "InvalidSignatureException",
    "ExpiredTokenException",
];

/// Classify a WAF error by code
///
/// `detail` is used when the error carries no message of its own.
pub fn classify_waf_error(code: Option<&str>, message: Option<&str>, detail: &str) -> Error {
    let message = match message {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => detail.to_string(),
    };

    match code {
        Some(c) if STALE_TOKEN_CODES.contains(&c) => Error::stale_token(message),
        Some(c) if NOT_FOUND_CODES.contains(&c) => Error::not_found(message),
        Some(c) if NOT_PROPAGATED_CODES.contains(&c) => Error::not_propagated(message),
        Some(c) if THROTTLING_CODES.contains(&c) => Error::throttled(message),
        Some(c) if IN_USE_CODES.contains(&c) => Error::in_use(message),
        Some(c) if LIMIT_CODES.contains(&c) => Error::limit_exceeded(message),
        Some(c) if INVALID_INPUT_CODES.contains(&c) => Error::invalid_input(message),
        Some(c) if PERMISSION_CODES.contains(&c) => Error::permission_denied(message),
        Some(c) => Error::provider(PROVIDER, format!("{}: {}", c, message)),
        None => Error::provider(PROVIDER, message),
    }
}
