//! Retry logic with linear backoff for failed download attempts.
//!
//! A failed attempt is classified into a [`FailureType`]; the
//! [`RetryPolicy`] then decides whether another attempt runs and how long to
//! wait before it.
//!
//! # Example
//!
//! ```
//! use bulkfetch_core::download::{
//!     DownloadError, RetryPolicy, RetryDecision, classify_error
//! };
//!
//! let policy = RetryPolicy::default();
//! let error = DownloadError::http_status("https://example.com/game.zip", 503);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

use super::DownloadError;

/// Default maximum attempts (including the first one).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay unit multiplied by the number of the attempt that just failed.
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);

/// Classification of download failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Network, HTTP status, storage or IO failure.
    Transient,

    /// Download root missing or unwritable. Retried: the user may fix the
    /// setting while the download waits.
    Configuration,

    /// The download was cancelled. Never retried.
    Cancelled,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Attempt budget and backoff for one download run.
///
/// With defaults the waits before attempts 2 and 3 are 2 s and 4 s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Delay unit; the wait after attempt `n` is `n * base_delay`.
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy with custom settings.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Creates a policy with a custom `max_attempts`, using the default delay.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the wait before the attempt following `failed_attempt`.
    #[must_use]
    pub fn delay_after(&self, failed_attempt: u32) -> Duration {
        self.base_delay.saturating_mul(failed_attempt)
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if failure_type == FailureType::Cancelled {
            return RetryDecision::DoNotRetry {
                reason: "download was cancelled".to_string(),
            };
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.delay_after(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }
}

/// Classifies a download error into a failure type for retry decisions.
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::Cancelled => FailureType::Cancelled,
        DownloadError::RootNotConfigured | DownloadError::RootUnavailable { .. } => {
            FailureType::Configuration
        }
        DownloadError::HttpStatus { .. }
        | DownloadError::Timeout { .. }
        | DownloadError::Network { .. }
        | DownloadError::Storage { .. }
        | DownloadError::Io { .. } => FailureType::Transient,
    }
}
