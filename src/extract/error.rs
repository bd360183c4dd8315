//! Error types for archive extraction.

use thiserror::Error;

/// Errors that can occur while extracting an archive.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The archive could not be opened through storage.
    #[error("cannot open archive {archive}")]
    Unreadable {
        /// Name of the archive.
        archive: String,
    },

    /// The archive structure is invalid.
    #[error("archive {archive} is corrupted: {detail}")]
    Corrupt {
        /// Name of the archive.
        archive: String,
        /// Decoder message.
        detail: String,
    },

    /// The archive holds more files than allowed.
    #[error("archive {archive} has more than {max} entries (counted {count})")]
    TooManyEntries {
        /// Name of the archive.
        archive: String,
        /// Entries counted before giving up.
        count: usize,
        /// Configured ceiling.
        max: usize,
    },

    /// Storage refused to create or open an output file.
    #[error("storage error extracting {entry}: {message}")]
    Storage {
        /// Output path inside the destination.
        entry: String,
        /// What went wrong.
        message: String,
    },

    /// Copying entry bytes failed.
    #[error("IO error extracting {entry}: {source}")]
    Io {
        /// Output path inside the destination.
        entry: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Extraction was cancelled.
    #[error("extraction cancelled")]
    Cancelled,
}

impl ExtractionError {
    /// Creates a corrupted-archive error.
    pub fn corrupt(archive: impl Into<String>, detail: impl ToString) -> Self {
        Self::Corrupt {
            archive: archive.into(),
            detail: detail.to_string(),
        }
    }

    /// Creates a storage error.
    pub fn storage(entry: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Storage {
            entry: entry.into(),
            message: message.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(entry: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            entry: entry.into(),
            source,
        }
    }
}
