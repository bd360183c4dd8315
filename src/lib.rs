//! Bulkfetch Core Library
//!
//! This library queues large HTTP downloads, streams them into a storage
//! root under a shared speed limit and a resizable concurrency budget,
//! retries transient failures and unpacks archives once they land.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`catalog`] - Download records and file name helpers
//! - [`download`] - Transport, throttle, admission limiter and the download manager
//! - [`extract`] - Zip, 7z and tar.gz extraction into storage
//! - [`lifecycle`] - Host presence while downloads are active
//! - [`settings`] - Live user settings read by running downloads
//! - [`storage`] - Storage abstraction and the filesystem backend
//! - [`tracker`] - Observable per-file progress and status

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod download;
pub mod extract;
pub mod lifecycle;
pub mod settings;
pub mod storage;
pub mod tracker;

#[cfg(test)]
pub mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use catalog::DownloadableFile;
pub use download::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DownloadError, DownloadManager, DownloadStats,
    EngineError, EngineOptions, FailureType, HttpClient, MAX_CONCURRENCY, RetryDecision,
    RetryPolicy, Transport, classify_error,
};
pub use extract::{ArchiveExtractor, ArchiveFormat, ExtractionError};
pub use lifecycle::{Presence, TracingPresence};
pub use settings::{Settings, SettingsWatch};
pub use storage::{FsStorage, Storage, StorageFile};
pub use tracker::{DownloadItem, DownloadList, DownloadStatus, ProgressTracker};
