//! Observable registry of download items.
//!
//! The tracker holds the only copy of the item list. Every mutation builds a
//! new list and publishes it through a [`watch`] channel, so observers always
//! see a whole, consistent snapshot. The tracker performs no I/O.
//!
//! # Rules enforced here
//!
//! - At most one item per `file_name`.
//! - Status updates follow [`DownloadStatus::can_transition_to`]; anything
//!   else is ignored and logged. Leaving a terminal state needs
//!   [`ProgressTracker::restart`].
//! - Progress updates for the same item are emitted at most once per
//!   interval unless they reach 1.0 or come through
//!   [`ProgressTracker::flush_progress`].
//! - While `Downloading`, `progress` and `downloaded_bytes` never decrease.

mod item;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

pub use item::{DownloadItem, DownloadStatus};

use crate::download::constants::PROGRESS_UPDATE_INTERVAL;

/// Snapshot type published to observers.
pub type DownloadList = Arc<Vec<DownloadItem>>;

/// Shared handle to the item registry. Cloning shares the same registry.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    inner: Arc<TrackerInner>,
}

#[derive(Debug)]
struct TrackerInner {
    items: watch::Sender<DownloadList>,
    last_emit: DashMap<String, Instant>,
    min_interval: Duration,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Creates an empty tracker with the default emission interval (500 ms).
    #[must_use]
    pub fn new() -> Self {
        Self::with_interval(PROGRESS_UPDATE_INTERVAL)
    }

    /// Creates an empty tracker with a custom minimum emission interval.
    #[must_use]
    pub fn with_interval(min_interval: Duration) -> Self {
        Self {
            inner: Arc::new(TrackerInner {
                items: watch::Sender::new(Arc::new(Vec::new())),
                last_emit: DashMap::new(),
                min_interval,
            }),
        }
    }

    /// Inserts `item`, replacing any item with the same `file_name` in place.
    pub fn add(&self, item: DownloadItem) {
        self.inner.last_emit.remove(&item.file_name);
        self.mutate(|items| {
            match items.iter_mut().find(|i| i.file_name == item.file_name) {
                Some(existing) => *existing = item,
                None => items.push(item),
            }
            true
        });
    }

    /// Moves an item to `status` if the edge is allowed. Returns whether it changed.
    pub fn update_status(&self, file_name: &str, status: DownloadStatus) -> bool {
        let mut rejected_from = None;
        let changed = self.mutate(|items| {
            let Some(item) = items.iter_mut().find(|i| i.file_name == file_name) else {
                return false;
            };
            if item.status == status {
                return false;
            }
            if !item.status.can_transition_to(status) {
                rejected_from = Some(item.status);
                return false;
            }
            item.status = status;
            if status == DownloadStatus::Unzipping {
                item.progress = 0.0;
            }
            if status != DownloadStatus::Downloading {
                item.download_speed_mbs = 0.0;
            }
            true
        });

        if let Some(from) = rejected_from {
            warn!(file_name, ?from, to = ?status, "ignoring invalid status transition");
        } else if changed {
            debug!(file_name, %status, "status changed");
        }
        changed
    }

    /// Reports progress, subject to the per-item emission interval.
    ///
    /// Returns whether observers were notified.
    pub fn update_progress(
        &self,
        file_name: &str,
        progress: f64,
        speed_mbs: f64,
        downloaded_bytes: u64,
    ) -> bool {
        let progress = clamp_progress(progress);
        if progress < 1.0
            && let Some(last) = self.inner.last_emit.get(file_name)
            && last.elapsed() < self.inner.min_interval
        {
            return false;
        }
        self.apply_progress(file_name, progress, speed_mbs, downloaded_bytes)
    }

    /// Reports progress immediately, bypassing the emission interval.
    pub fn flush_progress(
        &self,
        file_name: &str,
        progress: f64,
        speed_mbs: f64,
        downloaded_bytes: u64,
    ) -> bool {
        self.apply_progress(file_name, clamp_progress(progress), speed_mbs, downloaded_bytes)
    }

    /// Resets a terminal item's counters and moves it back to `Downloading`.
    pub fn restart(&self, file_name: &str) -> bool {
        self.inner.last_emit.remove(file_name);
        let restarted = self.mutate(|items| {
            let Some(item) = items.iter_mut().find(|i| i.file_name == file_name) else {
                return false;
            };
            if !item.status.is_terminal() {
                return false;
            }
            item.status = DownloadStatus::Downloading;
            item.progress = 0.0;
            item.download_speed_mbs = 0.0;
            item.downloaded_bytes = 0;
            true
        });
        if restarted {
            debug!(file_name, "item restarted");
        }
        restarted
    }

    /// Removes the item. Returns whether it existed.
    pub fn remove(&self, file_name: &str) -> bool {
        self.inner.last_emit.remove(file_name);
        self.mutate(|items| {
            let before = items.len();
            items.retain(|i| i.file_name != file_name);
            items.len() != before
        })
    }

    /// Current item list.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DownloadItem> {
        self.inner.items.borrow().as_ref().clone()
    }

    /// Live view of the item list.
    #[must_use]
    pub fn observe(&self) -> watch::Receiver<DownloadList> {
        self.inner.items.subscribe()
    }

    /// Copy of one item.
    #[must_use]
    pub fn get(&self, file_name: &str) -> Option<DownloadItem> {
        self.inner
            .items
            .borrow()
            .iter()
            .find(|i| i.file_name == file_name)
            .cloned()
    }

    /// Status of one item.
    #[must_use]
    pub fn status(&self, file_name: &str) -> Option<DownloadStatus> {
        self.inner
            .items
            .borrow()
            .iter()
            .find(|i| i.file_name == file_name)
            .map(|i| i.status)
    }

    /// True only for an existing `Failed` item.
    #[must_use]
    pub fn can_retry(&self, file_name: &str) -> bool {
        self.status(file_name) == Some(DownloadStatus::Failed)
    }

    /// True iff any item is `Downloading` or `Unzipping`.
    #[must_use]
    pub fn has_active(&self) -> bool {
        self.inner.items.borrow().iter().any(|i| i.status.is_active())
    }

    fn apply_progress(
        &self,
        file_name: &str,
        progress: f64,
        speed_mbs: f64,
        downloaded_bytes: u64,
    ) -> bool {
        let speed_mbs = if speed_mbs.is_finite() {
            speed_mbs.max(0.0)
        } else {
            0.0
        };
        let changed = self.mutate(|items| {
            let Some(item) = items.iter_mut().find(|i| i.file_name == file_name) else {
                return false;
            };
            let before = item.clone();
            match item.status {
                DownloadStatus::Downloading => {
                    item.progress = item.progress.max(progress);
                    item.downloaded_bytes = item.downloaded_bytes.max(downloaded_bytes);
                    item.download_speed_mbs = speed_mbs;
                }
                DownloadStatus::Unzipping => {
                    item.progress = progress;
                }
                DownloadStatus::Completed | DownloadStatus::Failed | DownloadStatus::Stopped => {
                    return false;
                }
            }
            *item != before
        });
        if changed {
            self.inner
                .last_emit
                .insert(file_name.to_string(), Instant::now());
        }
        changed
    }

    fn mutate(&self, f: impl FnOnce(&mut Vec<DownloadItem>) -> bool) -> bool {
        self.inner.items.send_if_modified(|current| {
            let mut next = current.as_ref().clone();
            if f(&mut next) {
                *current = Arc::new(next);
                true
            } else {
                false
            }
        })
    }
}

fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}
