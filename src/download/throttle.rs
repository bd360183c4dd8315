//! Transfer speed measurement and rate capping.
//!
//! [`SpeedThrottle`] accounts the bytes of one transfer in short windows.
//! When a window closes it measures the window's speed and, if a limit is
//! set, sleeps long enough that the window never ran faster than the limit.
//! The limit is re-read from the live setting at every evaluation.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::constants::{BYTES_PER_MB, SPEED_CHECK_INTERVAL};
use super::error::DownloadError;

/// Converts a byte count over an elapsed time into MB/s (binary megabytes).
///
/// Returns 0 when no time has elapsed.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn calculate_speed(bytes: u64, elapsed_seconds: f64) -> f64 {
    if elapsed_seconds <= 0.0 || !elapsed_seconds.is_finite() {
        return 0.0;
    }
    bytes as f64 / BYTES_PER_MB / elapsed_seconds
}

/// True when `limit` does not cap anything (infinite, zero, negative or NaN).
#[must_use]
pub fn is_unlimited(limit: f64) -> bool {
    !limit.is_finite() || limit <= 0.0
}

/// How long to sleep so `bytes_since_check` took at least `bytes / limit`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn throttle_delay(limit: f64, bytes_since_check: u64, elapsed_since_check: Duration) -> Duration {
    if is_unlimited(limit) {
        return Duration::ZERO;
    }
    let target_secs = bytes_since_check as f64 / BYTES_PER_MB / limit;
    let remaining = target_secs - elapsed_since_check.as_secs_f64();
    if remaining > 0.0 {
        Duration::try_from_secs_f64(remaining).unwrap_or(Duration::MAX)
    } else {
        Duration::ZERO
    }
}

/// Sleeps for the throttle delay of one window, waking early on cancellation.
///
/// `current_speed` is the uncapped speed of the window; a window already at
/// or under the limit never sleeps.
///
/// # Errors
///
/// Returns [`DownloadError::Cancelled`] if `cancel` fires while sleeping.
pub async fn apply_throttle(
    current_speed: f64,
    limit: f64,
    bytes_since_check: u64,
    elapsed_since_check: Duration,
    cancel: &CancellationToken,
) -> Result<Duration, DownloadError> {
    if is_unlimited(limit) || current_speed <= limit {
        return Ok(Duration::ZERO);
    }
    let delay = throttle_delay(limit, bytes_since_check, elapsed_since_check);
    if delay.is_zero() {
        return Ok(delay);
    }
    trace!(limit, delay_ms = delay.as_millis(), "throttling transfer");
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(DownloadError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(delay),
    }
}

/// Windowed speed accounting for a single transfer.
#[derive(Debug)]
pub struct SpeedThrottle {
    limit: watch::Receiver<f64>,
    started: Instant,
    window_start: Instant,
    window_bytes: u64,
    total_bytes: u64,
    recent_speed: Option<f64>,
}

impl SpeedThrottle {
    /// Starts measuring now, reading the cap from `limit`.
    #[must_use]
    pub fn new(limit: watch::Receiver<f64>) -> Self {
        let now = Instant::now();
        Self {
            limit,
            started: now,
            window_start: now,
            window_bytes: 0,
            total_bytes: 0,
            recent_speed: None,
        }
    }

    /// Accounts `bytes` just written, evaluating the window when it is due.
    ///
    /// A window is due after [`SPEED_CHECK_INTERVAL`] or as soon as it holds
    /// more bytes than the limit allows in that interval.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Cancelled`] if cancelled while throttling.
    #[allow(clippy::cast_precision_loss)]
    pub async fn record(
        &mut self,
        bytes: usize,
        cancel: &CancellationToken,
    ) -> Result<(), DownloadError> {
        self.window_bytes += bytes as u64;
        self.total_bytes += bytes as u64;

        let limit = *self.limit.borrow();
        let elapsed = self.window_start.elapsed();
        let over_budget = !is_unlimited(limit)
            && self.window_bytes as f64 > limit * BYTES_PER_MB * SPEED_CHECK_INTERVAL.as_secs_f64();

        if elapsed >= SPEED_CHECK_INTERVAL || over_budget {
            self.evaluate(limit, elapsed, cancel).await?;
        }
        Ok(())
    }

    /// Evaluates the trailing window once the stream has ended.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Cancelled`] if cancelled while throttling.
    pub async fn finish(&mut self, cancel: &CancellationToken) -> Result<(), DownloadError> {
        if self.window_bytes == 0 {
            return Ok(());
        }
        let limit = *self.limit.borrow();
        let elapsed = self.window_start.elapsed();
        self.evaluate(limit, elapsed, cancel).await
    }

    /// Most recent window speed, or the lifetime average before the first window closes.
    #[must_use]
    pub fn current_speed(&self) -> f64 {
        self.recent_speed.unwrap_or_else(|| self.average_speed())
    }

    /// Average speed since the throttle was created.
    #[must_use]
    pub fn average_speed(&self) -> f64 {
        calculate_speed(self.total_bytes, self.started.elapsed().as_secs_f64())
    }

    /// Bytes accounted so far.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    async fn evaluate(
        &mut self,
        limit: f64,
        elapsed: Duration,
        cancel: &CancellationToken,
    ) -> Result<(), DownloadError> {
        let raw_speed = if elapsed.is_zero() {
            f64::INFINITY
        } else {
            calculate_speed(self.window_bytes, elapsed.as_secs_f64())
        };
        let slept = apply_throttle(raw_speed, limit, self.window_bytes, elapsed, cancel).await?;

        // Elapsed can be zero under a paused clock; keep the previous figure then.
        let effective = calculate_speed(self.window_bytes, (elapsed + slept).as_secs_f64());
        if effective > 0.0 {
            self.recent_speed = Some(effective);
        }
        self.window_start = Instant::now();
        self.window_bytes = 0;
        Ok(())
    }
}
