//! Constants for the download module (timeouts, pacing, buffer sizes).

use std::time::Duration;

/// HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// HTTP read timeout (60 seconds without a byte).
pub const READ_TIMEOUT_SECS: u64 = 60;

/// Maximum size of a single write to the storage sink.
pub const BUFFER_SIZE: usize = 8 * 1024;

/// Minimum transfer time between two throttle evaluations.
pub const SPEED_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Minimum interval between two progress emissions for the same item.
pub const PROGRESS_UPDATE_INTERVAL: Duration = Duration::from_millis(500);

/// Delay between admission of a new download and its slot acquisition.
pub const ADMISSION_DELAY: Duration = Duration::from_secs(1);

/// Delay before a user-requested retry starts.
pub const RETRY_ADMISSION_DELAY: Duration = Duration::from_secs(2);

/// Default number of simultaneous transfers.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Upper bound accepted for the concurrency budget.
pub const MAX_CONCURRENCY: usize = 16;

/// Bytes per megabyte used for every speed figure (binary megabyte).
pub const BYTES_PER_MB: f64 = 1_048_576.0;

/// MIME type used when creating download destinations.
pub const OCTET_STREAM: &str = "application/octet-stream";
