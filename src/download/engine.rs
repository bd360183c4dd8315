//! Download manager: scheduling, retries, cancellation and post-processing.
//!
//! The [`DownloadManager`] owns three registries keyed by `file_name`: the
//! running task of each download, the original request (kept for retry) and
//! the artifact it produced (kept for delete). Observable state lives in the
//! [`ProgressTracker`].
//!
//! # Task lifecycle
//!
//! `start_download` registers a `Downloading` item and spawns one task. The
//! task waits the admission delay, takes an [`AdmissionLimiter`] slot, runs
//! up to three transfer attempts, then extracts the archive if needed. The
//! slot is an RAII guard released on every exit path. Cancelling the task's
//! token yields `Stopped`; any other failure yields `Failed`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bulkfetch_core::{DownloadManager, DownloadableFile, EngineOptions, FsStorage, HttpClient, Settings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = Settings::new();
//! settings.set_download_root("/srv/roms");
//! let manager = DownloadManager::new(
//!     Arc::new(HttpClient::new()),
//!     Arc::new(FsStorage::new()),
//!     settings.subscribe(),
//!     EngineOptions::default(),
//! );
//! manager.start_download(DownloadableFile::new("Game", "game.zip", "https://example.com/game.zip"))?;
//! # Ok(())
//! # }
//! ```

mod transfer;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::constants::{ADMISSION_DELAY, PROGRESS_UPDATE_INTERVAL, RETRY_ADMISSION_DELAY};
use super::error::{DownloadError, EngineError};
use super::limiter::AdmissionLimiter;
use super::retry::{RetryDecision, RetryPolicy, classify_error};
use super::Transport;
use crate::catalog::DownloadableFile;
use crate::extract::{ArchiveExtractor, ArchiveFormat, DEFAULT_MAX_ENTRIES, ExtractionError};
use crate::lifecycle::{LifecycleSignal, Presence, TracingPresence};
use crate::settings::SettingsWatch;
use crate::storage::{Storage, StorageFile};
use crate::tracker::{DownloadItem, DownloadList, DownloadStatus, ProgressTracker};

/// Tunables of a [`DownloadManager`]. Defaults match production behaviour.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Wait between `start_download` and slot acquisition.
    pub admission_delay: Duration,
    /// Wait between `retry_download` and slot acquisition.
    pub retry_admission_delay: Duration,
    /// Attempt budget and backoff inside one run.
    pub retry_policy: RetryPolicy,
    /// Minimum interval between progress emissions per item.
    pub progress_interval: Duration,
    /// File entry ceiling for extraction.
    pub max_archive_entries: usize,
    /// Host presence shown while downloads are active.
    pub presence: Arc<dyn Presence>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            admission_delay: ADMISSION_DELAY,
            retry_admission_delay: RETRY_ADMISSION_DELAY,
            retry_policy: RetryPolicy::default(),
            progress_interval: PROGRESS_UPDATE_INTERVAL,
            max_archive_entries: DEFAULT_MAX_ENTRIES,
            presence: Arc::new(TracingPresence),
        }
    }
}

/// Counters over the manager's lifetime.
///
/// Uses atomic counters for updates from concurrent download tasks.
#[derive(Debug, Default)]
pub struct DownloadStats {
    completed: AtomicUsize,
    failed: AtomicUsize,
    stopped: AtomicUsize,
    retried: AtomicUsize,
}

impl DownloadStats {
    /// Returns the number of runs that ended `Completed`.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Returns the number of runs that ended `Failed`.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the number of runs that ended `Stopped`.
    #[must_use]
    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Returns the number of automatic retry attempts made.
    #[must_use]
    pub fn retried(&self) -> usize {
        self.retried.load(Ordering::SeqCst)
    }

    fn record(&self, outcome: &RunOutcome) {
        let counter = match outcome {
            RunOutcome::Completed => &self.completed,
            RunOutcome::Failed(_) => &self.failed,
            RunOutcome::Stopped => &self.stopped,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Schedules downloads and exposes cancel, retry and delete.
///
/// Cloning shares the same registries. Must be created inside a Tokio
/// runtime: construction spawns the watchers that apply concurrency changes
/// and drive the host presence.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadManager")
            .field("tasks", &self.inner.tasks.len())
            .field("requests", &self.inner.requests.len())
            .field("concurrency", &self.inner.limiter.capacity())
            .finish_non_exhaustive()
    }
}

struct ManagerInner {
    transport: Arc<dyn Transport>,
    storage: Arc<dyn Storage>,
    settings: SettingsWatch,
    tracker: ProgressTracker,
    limiter: AdmissionLimiter,
    extractor: ArchiveExtractor,
    lifecycle: LifecycleSignal,
    options: EngineOptions,
    tasks: DashMap<String, TaskHandle>,
    requests: DashMap<String, DownloadableFile>,
    artifacts: DashMap<String, Artifact>,
    stats: DownloadStats,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

struct TaskHandle {
    token: CancellationToken,
    generation: u64,
}

/// What a finished run left in storage.
#[derive(Debug, Clone)]
enum Artifact {
    Archive(StorageFile),
    Extracted(Vec<StorageFile>),
}

/// Identity of one run of one download.
struct RunContext {
    file: DownloadableFile,
    token: CancellationToken,
    generation: u64,
}

/// A finished transfer, before post-processing.
#[derive(Debug)]
struct StoredDownload {
    root: String,
    sub_path: String,
    file: StorageFile,
}

#[derive(Debug)]
enum RunOutcome {
    Completed,
    Failed(String),
    Stopped,
}

impl DownloadManager {
    /// Creates a manager and starts its background watchers.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        storage: Arc<dyn Storage>,
        settings: SettingsWatch,
        options: EngineOptions,
    ) -> Self {
        let limiter = AdmissionLimiter::new(settings.concurrency());
        let inner = Arc::new(ManagerInner {
            transport,
            storage,
            tracker: ProgressTracker::with_interval(options.progress_interval),
            limiter,
            extractor: ArchiveExtractor::with_max_entries(options.max_archive_entries),
            lifecycle: LifecycleSignal::new(Arc::clone(&options.presence)),
            settings,
            options,
            tasks: DashMap::new(),
            requests: DashMap::new(),
            artifacts: DashMap::new(),
            stats: DownloadStats::default(),
            next_generation: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        });

        spawn_concurrency_watcher(
            inner.settings.concurrency.clone(),
            inner.limiter.clone(),
            inner.shutdown.clone(),
        );
        spawn_lifecycle_watcher(
            inner.tracker.clone(),
            inner.lifecycle.clone(),
            inner.shutdown.clone(),
        );

        Self { inner }
    }

    /// Registers and schedules a download.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::AlreadyActive`] if a task for the same
    /// `file_name` is still running.
    #[instrument(skip(self, file), fields(file_name = %file.file_name))]
    pub fn start_download(&self, file: DownloadableFile) -> Result<(), EngineError> {
        let name = file.file_name.clone();
        let token = CancellationToken::new();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);

        match self.inner.tasks.entry(name.clone()) {
            Entry::Occupied(_) => {
                debug!("rejecting start, task still live");
                return Err(EngineError::AlreadyActive { file_name: name });
            }
            Entry::Vacant(slot) => {
                slot.insert(TaskHandle {
                    token: token.clone(),
                    generation,
                });
            }
        }

        self.inner.tracker.add(DownloadItem::from_file(&file));
        self.inner.requests.insert(name.clone(), file.clone());
        self.inner.artifacts.remove(&name);
        self.inner.lifecycle.ensure_started();
        info!(url = %file.download_url, "download queued");

        self.spawn_run(
            RunContext {
                file,
                token,
                generation,
            },
            self.inner.options.admission_delay,
        );
        Ok(())
    }

    /// Cancels a download. The item becomes `Stopped`.
    #[instrument(skip(self))]
    pub fn cancel_download(&self, file_name: &str) {
        if let Some((_, handle)) = self.inner.tasks.remove(file_name) {
            handle.token.cancel();
            debug!("task cancelled");
        }
        self.inner
            .tracker
            .update_status(file_name, DownloadStatus::Stopped);
    }

    /// Cancels every running download.
    pub fn cancel_all(&self) {
        let names: Vec<String> = self
            .inner
            .tasks
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for name in names {
            self.cancel_download(&name);
        }
    }

    /// Schedules a fresh run of a `Failed` download.
    ///
    /// Returns whether a retry was scheduled. Items in any other state, or
    /// without a retained request, are left alone.
    #[instrument(skip(self))]
    pub fn retry_download(&self, file_name: &str) -> bool {
        let Some(file) = self
            .inner
            .requests
            .get(file_name)
            .map(|entry| entry.value().clone())
        else {
            debug!("no retained request, not retrying");
            return false;
        };
        if !self.inner.tracker.can_retry(file_name) || !self.inner.tracker.restart(file_name) {
            debug!("item is not failed, not retrying");
            return false;
        }

        let token = CancellationToken::new();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        self.inner.tasks.insert(
            file_name.to_string(),
            TaskHandle {
                token: token.clone(),
                generation,
            },
        );
        self.inner.artifacts.remove(file_name);
        self.inner.lifecycle.ensure_started();
        info!("retry scheduled");

        self.spawn_run(
            RunContext {
                file,
                token,
                generation,
            },
            self.inner.options.retry_admission_delay,
        );
        true
    }

    /// Forgets a download entirely, optionally deleting what it produced.
    ///
    /// Deletion is best effort; storage failures are logged and ignored.
    #[instrument(skip(self))]
    pub fn delete_download(&self, file_name: &str, delete_file: bool) {
        if let Some((_, handle)) = self.inner.tasks.remove(file_name) {
            handle.token.cancel();
        }
        self.inner.requests.remove(file_name);
        let artifact = self.inner.artifacts.remove(file_name).map(|(_, a)| a);
        self.inner.tracker.remove(file_name);

        if !delete_file {
            return;
        }
        let files = match artifact {
            Some(Artifact::Archive(file)) => vec![file],
            Some(Artifact::Extracted(files)) => files,
            None => Vec::new(),
        };
        for file in &files {
            if !self.inner.storage.delete(file) {
                warn!(file = %file, "could not delete artifact");
            }
        }
        info!(deleted = files.len(), "download deleted");
    }

    /// Snapshot of every item.
    #[must_use]
    pub fn downloads(&self) -> Vec<DownloadItem> {
        self.inner.tracker.snapshot()
    }

    /// Live view of the item list.
    #[must_use]
    pub fn observe(&self) -> watch::Receiver<DownloadList> {
        self.inner.tracker.observe()
    }

    /// True while any item is downloading or extracting.
    #[must_use]
    pub fn has_active(&self) -> bool {
        self.inner.tracker.has_active()
    }

    /// The tracker backing this manager.
    #[must_use]
    pub fn tracker(&self) -> &ProgressTracker {
        &self.inner.tracker
    }

    /// Lifetime counters.
    #[must_use]
    pub fn stats(&self) -> &DownloadStats {
        &self.inner.stats
    }

    fn spawn_run(&self, run: RunContext, delay: Duration) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let outcome = inner.run(&run, delay).await;
            inner.finish(&run, &outcome);
        });
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl ManagerInner {
    /// True while `run` is still the registered task for its file name.
    fn owns(&self, run: &RunContext) -> bool {
        self.tasks
            .get(&run.file.file_name)
            .is_some_and(|handle| handle.generation == run.generation)
    }

    fn set_status(&self, run: &RunContext, status: DownloadStatus) {
        if self.owns(run) {
            self.tracker.update_status(&run.file.file_name, status);
        }
    }

    async fn run(&self, run: &RunContext, delay: Duration) -> RunOutcome {
        let token = &run.token;
        tokio::select! {
            biased;
            () = token.cancelled() => return RunOutcome::Stopped,
            () = tokio::time::sleep(delay) => {}
        }

        let permit = tokio::select! {
            biased;
            () = token.cancelled() => return RunOutcome::Stopped,
            permit = self.limiter.acquire() => permit,
        };
        // Permit is dropped when this function returns (RAII)
        let _permit = match permit {
            Ok(permit) => permit,
            Err(e) => return RunOutcome::Failed(e.to_string()),
        };
        debug!(file_name = %run.file.file_name, "admission slot acquired");

        let stored = match self.download_with_retry(run).await {
            Ok(stored) => stored,
            Err(_) if token.is_cancelled() => return RunOutcome::Stopped,
            Err(e) => return RunOutcome::Failed(e.to_string()),
        };

        self.post_process(run, stored).await
    }

    fn finish(&self, run: &RunContext, outcome: &RunOutcome) {
        let name = &run.file.file_name;
        let outcome = if run.token.is_cancelled() {
            &RunOutcome::Stopped
        } else {
            outcome
        };

        match outcome {
            RunOutcome::Completed => {
                info!(file_name = %name, "download completed");
                self.set_status(run, DownloadStatus::Completed);
            }
            RunOutcome::Failed(reason) => {
                warn!(file_name = %name, %reason, "download failed");
                self.set_status(run, DownloadStatus::Failed);
            }
            RunOutcome::Stopped => {
                info!(file_name = %name, "download stopped");
                self.set_status(run, DownloadStatus::Stopped);
            }
        }
        self.stats.record(outcome);
        self.tasks
            .remove_if(name, |_, handle| handle.generation == run.generation);
    }

    /// Runs attempts until one succeeds or the retry policy gives up.
    #[instrument(skip(self, run), fields(file_name = %run.file.file_name, url = %run.file.download_url))]
    async fn download_with_retry(&self, run: &RunContext) -> Result<StoredDownload, DownloadError> {
        let policy = &self.options.retry_policy;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            if run.token.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            debug!(attempt, "attempting download");

            let error = match self.attempt(run).await {
                Ok(stored) => return Ok(stored),
                Err(_) if run.token.is_cancelled() => return Err(DownloadError::Cancelled),
                Err(e) => e,
            };

            match policy.should_retry(classify_error(&error), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    info!(
                        attempt = next_attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying download"
                    );
                    self.stats.retried.fetch_add(1, Ordering::SeqCst);
                    tokio::select! {
                        biased;
                        () = run.token.cancelled() => return Err(DownloadError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(%reason, "not retrying download");
                    return Err(error);
                }
            }
        }
    }

    /// Extracts the artifact if it is an archive and auto-extract is on.
    async fn post_process(&self, run: &RunContext, stored: StoredDownload) -> RunOutcome {
        let name = run.file.file_name.clone();
        self.artifacts
            .insert(name.clone(), Artifact::Archive(stored.file.clone()));

        let format = ArchiveFormat::from_name(&run.file.file_extension)
            .or_else(|| ArchiveFormat::from_name(stored.file.name()));
        let Some(format) = format else {
            return RunOutcome::Completed;
        };
        if !self.settings.auto_extract() {
            debug!(file_name = %name, "auto-extract disabled, keeping archive");
            return RunOutcome::Completed;
        }

        self.set_status(run, DownloadStatus::Unzipping);
        info!(file_name = %name, ?format, "extracting archive");

        let storage = Arc::clone(&self.storage);
        let extractor = self.extractor.clone();
        let tracker = self.tracker.clone();
        let token = run.token.clone();
        let archive = stored.file.clone();
        let progress_name = name.clone();
        let extraction = tokio::task::spawn_blocking(move || {
            let mut on_progress = |fraction: f64| {
                if !token.is_cancelled() {
                    tracker.update_progress(&progress_name, fraction, 0.0, 0);
                }
            };
            extractor.extract_as(
                format,
                storage.as_ref(),
                &archive,
                &stored.root,
                &stored.sub_path,
                &mut on_progress,
                &token,
            )
        })
        .await;

        match extraction {
            Ok(Ok(files)) => {
                if !self.storage.delete(&stored.file) {
                    warn!(file_name = %name, "could not delete archive after extraction");
                }
                self.artifacts.insert(
                    name,
                    Artifact::Extracted(files.into_iter().map(|f| f.file).collect()),
                );
                RunOutcome::Completed
            }
            Ok(Err(ExtractionError::Cancelled)) => RunOutcome::Stopped,
            Ok(Err(e)) => RunOutcome::Failed(e.to_string()),
            Err(join_error) => RunOutcome::Failed(format!("extraction task failed: {join_error}")),
        }
    }
}

fn spawn_concurrency_watcher(
    mut concurrency: watch::Receiver<usize>,
    limiter: AdmissionLimiter,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        limiter.set_capacity(*concurrency.borrow_and_update());
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                changed = concurrency.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let budget = *concurrency.borrow_and_update();
                    limiter.set_capacity(budget);
                }
            }
        }
    });
}

fn spawn_lifecycle_watcher(
    tracker: ProgressTracker,
    lifecycle: LifecycleSignal,
    shutdown: CancellationToken,
) {
    let mut items = tracker.observe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                changed = items.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    lifecycle.refresh(tracker.has_active());
                }
            }
        }
    });
}
