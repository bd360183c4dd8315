//! Error types for the download module.
//!
//! This module defines structured errors for every step of a download
//! attempt, carrying the URL or file they concern.

use thiserror::Error;

/// Errors that can occur during a single download attempt.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// No download root has been configured.
    #[error("download location is not configured")]
    RootNotConfigured,

    /// The configured root exists in configuration but cannot be written.
    #[error("download location {root} is not writable")]
    RootUnavailable {
        /// The configured root.
        root: String,
    },

    /// The server answered with something other than 200.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// Connect or read timed out.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The storage layer refused an operation.
    #[error("storage error for {file_name}: {message}")]
    Storage {
        /// Name of the file involved.
        file_name: String,
        /// What went wrong.
        message: String,
    },

    /// Writing to the destination sink failed.
    #[error("IO error writing {file_name}: {source}")]
    Io {
        /// Name of the file being written.
        file_name: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The download was cancelled.
    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a root-unavailable error.
    pub fn root_unavailable(root: impl Into<String>) -> Self {
        Self::RootUnavailable { root: root.into() }
    }

    /// Creates a storage error.
    pub fn storage(file_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            file_name: file_name.into(),
            message: message.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(file_name: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            file_name: file_name.into(),
            source,
        }
    }

    /// Returns true for the cancellation variant.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

// Note on From trait implementations:
// No `From<reqwest::Error>` or `From<std::io::Error>`: every variant needs the
// URL or file name, which the source errors don't carry.

/// Errors raised by the manager API itself.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// A task for this file name is still running.
    #[error("download already active for {file_name}")]
    AlreadyActive {
        /// The rejected file name.
        file_name: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_http_status_display() {
        let error = DownloadError::http_status("https://example.com/game.zip", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(msg.contains("https://example.com/game.zip"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_download_error_timeout_display() {
        let error = DownloadError::timeout("https://example.com/game.zip");
        assert!(error.to_string().contains("timeout"));
    }

    #[test]
    fn test_download_error_root_display() {
        assert_eq!(
            DownloadError::RootNotConfigured.to_string(),
            "download location is not configured"
        );
        let msg = DownloadError::root_unavailable("/mnt/missing").to_string();
        assert!(msg.contains("/mnt/missing"), "Expected root in: {msg}");
    }

    #[test]
    fn test_download_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::StorageFull, "disk full");
        let msg = DownloadError::io("game.zip", io_error).to_string();
        assert!(msg.contains("game.zip"), "Expected file name in: {msg}");
        assert!(msg.contains("disk full"), "Expected cause in: {msg}");
    }

    #[test]
    fn test_download_error_is_cancelled() {
        assert!(DownloadError::Cancelled.is_cancelled());
        assert!(!DownloadError::timeout("u").is_cancelled());
    }

    #[test]
    fn test_engine_error_already_active_display() {
        let error = EngineError::AlreadyActive {
            file_name: "game.zip".to_string(),
        };
        assert_eq!(error.to_string(), "download already active for game.zip");
    }
}
