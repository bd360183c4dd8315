//! Exit code logic for the bulkfetch process.
//!
//! Single responsibility: map the final item states to the process exit outcome.

use std::process::ExitCode;

use bulkfetch_core::{DownloadItem, DownloadStatus};

/// How the run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    Success,
    Partial,
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(outcome: ProcessExit) -> Self {
        match outcome {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Failure => ExitCode::from(1),
            ProcessExit::Partial => ExitCode::from(2),
        }
    }
}

/// Counts of the final item states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) completed: usize,
    pub(crate) failed: usize,
    pub(crate) stopped: usize,
}

impl RunSummary {
    pub(crate) fn from_items(items: &[DownloadItem]) -> Self {
        items.iter().fold(Self::default(), |mut summary, item| {
            match item.status {
                DownloadStatus::Completed => summary.completed += 1,
                DownloadStatus::Failed => summary.failed += 1,
                DownloadStatus::Stopped => summary.stopped += 1,
                DownloadStatus::Downloading | DownloadStatus::Unzipping => {}
            }
            summary
        })
    }
}

/// Stopped downloads count as unfinished, like failures.
pub(crate) fn determine_exit_outcome(summary: RunSummary) -> ProcessExit {
    let unfinished = summary.failed + summary.stopped;
    if unfinished == 0 {
        ProcessExit::Success
    } else if summary.completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}
