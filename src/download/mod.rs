//! Download engine: transport, throttling, admission and retries.
//!
//! A [`DownloadManager`] streams each [`crate::catalog::DownloadableFile`]
//! through a [`Transport`] into [`crate::storage::Storage`], publishing
//! progress to the [`crate::tracker::ProgressTracker`].
//!
//! # Features
//!
//! - Streaming transfers in 8 KiB writes (memory use does not grow with file size)
//! - Live speed limit shared by every transfer
//! - Resizable admission budget (1 to 16 concurrent transfers)
//! - Up to three attempts per run with linear backoff
//! - Optional archive extraction after transfer
//!
//! # Example
//!
//! ```no_run
//! use bulkfetch_core::download::{HttpClient, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HttpClient::new();
//! let response = client.open("https://example.com/game.zip").await?;
//! println!("size: {:?}", response.content_length);
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod limiter;
mod retry;
mod throttle;

pub use client::{HttpClient, ResponseStream, Transport};
pub use constants::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY};
pub use engine::{DownloadManager, DownloadStats, EngineOptions};
pub use error::{DownloadError, EngineError};
pub use limiter::{AdmissionLimiter, AdmissionPermit};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy, classify_error};
pub use throttle::{SpeedThrottle, apply_throttle, calculate_speed, is_unlimited, throttle_delay};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
