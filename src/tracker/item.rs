//! Observable download records and their status machine.

use std::fmt;

use serde::Serialize;

use crate::catalog::DownloadableFile;

/// Lifecycle status of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Waiting for a slot or transferring bytes.
    Downloading,
    /// Archive extraction in progress.
    Unzipping,
    /// Finished successfully.
    Completed,
    /// Gave up after the attempt budget or a failed extraction.
    Failed,
    /// Cancelled by the user.
    Stopped,
}

impl DownloadStatus {
    /// True for `Downloading` and `Unzipping`.
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Downloading | Self::Unzipping)
    }

    /// True for `Completed`, `Failed` and `Stopped`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Whether a status update may move from `self` to `next`.
    ///
    /// Terminal states only leave through an explicit restart, which does not
    /// go through this check.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use DownloadStatus::{Completed, Downloading, Failed, Stopped, Unzipping};
        matches!(
            (self, next),
            (Downloading, Unzipping | Completed | Failed | Stopped)
                | (Unzipping, Completed | Failed | Stopped)
        )
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Downloading => "downloading",
            Self::Unzipping => "extracting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Engine-owned state of one download, keyed by `file_name`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DownloadItem {
    pub display_name: String,
    pub file_name: String,
    /// Current speed in MB/s, never negative.
    pub download_speed_mbs: f64,
    /// Fraction in `[0, 1]`. While extracting this is the extraction fraction.
    pub progress: f64,
    pub file_size_bytes: u64,
    pub downloaded_bytes: u64,
    pub status: DownloadStatus,
}

impl DownloadItem {
    /// Fresh `Downloading` item for a catalog record.
    #[must_use]
    pub fn from_file(file: &DownloadableFile) -> Self {
        Self {
            display_name: file.display_name.clone(),
            file_name: file.file_name.clone(),
            download_speed_mbs: 0.0,
            progress: 0.0,
            file_size_bytes: file.file_size_bytes,
            downloaded_bytes: 0,
            status: DownloadStatus::Downloading,
        }
    }

    /// Progress as a whole percentage in `0..=100`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn percentage(&self) -> u8 {
        (self.progress * 100.0).clamp(0.0, 100.0) as u8
    }
}
