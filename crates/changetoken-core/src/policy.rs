//! Retry policies
//!
//! A [`RetryPolicy`] answers two questions for the retryer: "is this error
//! worth another attempt?" and "how long do I wait first?". It is built either
//! in code or from a [`RetryConfig`].

use crate::config::{BackoffConfig, RetryConfig};
use crate::error::{Error, ErrorKind, Result};
use rand::Rng;
use std::collections::BTreeSet;
use std::time::Duration;

/// Delay schedule between attempts
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay every time
    Fixed(Duration),

    /// `initial * factor^n`, capped at `max`
    Exponential {
        initial: Duration,
        max: Duration,
        factor: f64,
    },
}

impl Backoff {
    /// Delay before retry number `retry` (0 = first retry), without jitter
    pub fn delay(&self, retry: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential {
                initial,
                max,
                factor,
            } => {
                let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
                let secs = initial.as_secs_f64() * factor.powi(exponent);
                Duration::from_secs_f64(secs.min(max.as_secs_f64()))
            }
        }
    }
}

impl From<&BackoffConfig> for Backoff {
    fn from(config: &BackoffConfig) -> Self {
        match config {
            BackoffConfig::Fixed { delay_ms } => Backoff::Fixed(Duration::from_millis(*delay_ms)),
            BackoffConfig::Exponential {
                initial_delay_ms,
                max_delay_ms,
                multiplier,
            } => Backoff::Exponential {
                initial: Duration::from_millis(*initial_delay_ms),
                max: Duration::from_millis(*max_delay_ms),
                factor: *multiplier,
            },
        }
    }
}

/// Retry policy for one class of mutating calls
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_elapsed: Duration,
    backoff: Backoff,
    jitter: f64,
    retryable: BTreeSet<ErrorKind>,
}

impl RetryPolicy {
    /// Create a policy retrying the default error kinds
    pub fn new(max_elapsed: Duration, backoff: Backoff) -> Self {
        Self {
            max_elapsed,
            backoff,
            jitter: 0.0,
            retryable: ErrorKind::DEFAULT_RETRYABLE.into_iter().collect(),
        }
    }

    /// Set the jitter fraction (clamped to `[0, 1]`)
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter.clamp(0.0, 1.0);
        self
    }

    /// Set the time budget
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    /// Also retry errors of `kind`
    ///
    /// Terminal kinds (`Timeout`, `Canceled`, `Fatal`) are ignored.
    pub fn with_retryable(mut self, kind: ErrorKind) -> Self {
        if !kind.is_terminal() {
            self.retryable.insert(kind);
        }
        self
    }

    /// Stop retrying errors of `kind`
    pub fn without_retryable(mut self, kind: ErrorKind) -> Self {
        self.retryable.remove(&kind);
        self
    }

    /// Time budget for the whole retry loop
    pub fn max_elapsed(&self) -> Duration {
        self.max_elapsed
    }

    /// The delay schedule
    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Kinds this policy retries
    pub fn retryable_kinds(&self) -> impl Iterator<Item = ErrorKind> + '_ {
        self.retryable.iter().copied()
    }

    /// Whether `error` warrants another attempt
    pub fn is_retryable(&self, error: &Error) -> bool {
        let kind = error.kind();
        !kind.is_terminal() && self.retryable.contains(&kind)
    }

    /// Delay before retry number `retry`, with jitter applied
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.backoff.delay(retry);
        if self.jitter == 0.0 || base.is_zero() {
            return base;
        }

        let spread = rand::rng().random_range(-self.jitter..=self.jitter);
        base.mul_f64((1.0 + spread).max(0.0))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // The default config always validates
        Self::from_config_unchecked(&RetryConfig::default())
    }
}

impl RetryPolicy {
    /// Build from configuration, validating it first
    pub fn from_config(config: &RetryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_config_unchecked(config))
    }

    fn from_config_unchecked(config: &RetryConfig) -> Self {
        Self {
            max_elapsed: Duration::from_secs(config.max_elapsed_secs),
            backoff: Backoff::from(&config.backoff),
            jitter: config.jitter.clamp(0.0, 1.0),
            retryable: config
                .retry_on
                .iter()
                .copied()
                .filter(|k| !k.is_terminal())
                .collect(),
        }
    }
}

impl TryFrom<&RetryConfig> for RetryPolicy {
    type Error = Error;

    fn try_from(config: &RetryConfig) -> Result<Self> {
        Self::from_config(config)
    }
}
