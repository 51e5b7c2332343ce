//! Configuration types for the change-token retry core
//!
//! Retry behaviour is data, not code: every resource type can carry its own
//! budget, backoff schedule and retryable error set.
//!
//! ```json
//! {
//!   "default": { "max_elapsed_secs": 900 },
//!   "resources": {
//!     "aws_waf_regex_match_set": {
//!       "max_elapsed_secs": 300,
//!       "backoff": { "type": "fixed", "delay_ms": 1000 },
//!       "retry_on": ["stale_token", "not_found"]
//!     }
//!   }
//! }
//! ```

use crate::error::{Error, ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Top-level retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPoliciesConfig {
    /// Policy used for resource types without an override
    #[serde(default)]
    pub default: RetryConfig,

    /// Per resource type overrides, keyed by resource type name
    #[serde(default)]
    pub resources: HashMap<String, RetryConfig>,

    /// Capacity of the retry event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl RetryPoliciesConfig {
    /// Create a configuration with defaults and no overrides
    pub fn new() -> Self {
        Self {
            default: RetryConfig::default(),
            resources: HashMap::new(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }

    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Loading retry policy config from {:?}", path);
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.event_channel_capacity == 0 {
            return Err(Error::config("event_channel_capacity must be > 0"));
        }

        self.default
            .validate()
            .map_err(|e| Error::config(format!("default policy: {}", e)))?;

        for (name, config) in &self.resources {
            if name.is_empty() {
                return Err(Error::config("Resource type name cannot be empty"));
            }
            config
                .validate()
                .map_err(|e| Error::config(format!("policy for {}: {}", name, e)))?;
        }

        Ok(())
    }
}

impl Default for RetryPoliciesConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Retry settings for one class of mutating calls
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum wall-clock time spent retrying (in seconds)
    #[serde(default = "default_max_elapsed_secs")]
    pub max_elapsed_secs: u64,

    /// Delay schedule between attempts
    #[serde(default)]
    pub backoff: BackoffConfig,

    /// Random spread applied to every delay, as a fraction in `[0, 1]`
    ///
    /// A jitter of 0.5 turns a 2s delay into something between 1s and 3s.
    #[serde(default)]
    pub jitter: f64,

    /// Error kinds that trigger another attempt
    #[serde(default = "default_retry_on")]
    pub retry_on: Vec<ErrorKind>,
}

impl RetryConfig {
    /// Validate the settings
    pub fn validate(&self) -> Result<()> {
        if self.max_elapsed_secs == 0 {
            return Err(Error::config("max_elapsed_secs must be > 0"));
        }

        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(Error::config(format!(
                "jitter must be between 0 and 1, got {}",
                self.jitter
            )));
        }

        if self.retry_on.is_empty() {
            return Err(Error::config("retry_on must name at least one error kind"));
        }

        if let Some(kind) = self.retry_on.iter().find(|k| k.is_terminal()) {
            return Err(Error::config(format!("{:?} can never be retried", kind)));
        }

        self.backoff.validate()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_elapsed_secs: default_max_elapsed_secs(),
            backoff: BackoffConfig::default(),
            jitter: 0.0,
            retry_on: default_retry_on(),
        }
    }
}

/// Backoff schedule configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffConfig {
    /// Same delay before every retry
    Fixed {
        /// Delay in milliseconds
        delay_ms: u64,
    },

    /// Delay grows by `multiplier` after each retry, up to `max_delay_ms`
    Exponential {
        /// First delay in milliseconds
        #[serde(default = "default_initial_delay_ms")]
        initial_delay_ms: u64,
        /// Upper bound for a single delay in milliseconds
        #[serde(default = "default_max_delay_ms")]
        max_delay_ms: u64,
        /// Growth factor
        #[serde(default = "default_multiplier")]
        multiplier: f64,
    },
}

impl BackoffConfig {
    /// Validate the schedule
    pub fn validate(&self) -> Result<()> {
        match self {
            BackoffConfig::Fixed { .. } => Ok(()),
            BackoffConfig::Exponential {
                initial_delay_ms,
                max_delay_ms,
                multiplier,
            } => {
                if initial_delay_ms > max_delay_ms {
                    return Err(Error::config(format!(
                        "initial_delay_ms ({}) exceeds max_delay_ms ({})",
                        initial_delay_ms, max_delay_ms
                    )));
                }
                if !multiplier.is_finite() || *multiplier < 1.0 {
                    return Err(Error::config(format!(
                        "multiplier must be >= 1, got {}",
                        multiplier
                    )));
                }
                Ok(())
            }
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Exponential {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

fn default_max_elapsed_secs() -> u64 {
    15 * 60
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_retry_on() -> Vec<ErrorKind> {
    ErrorKind::DEFAULT_RETRYABLE.to_vec()
}

fn default_event_channel_capacity() -> usize {
    256
}
