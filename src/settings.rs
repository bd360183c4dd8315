//! Live engine configuration.
//!
//! Every setting is a [`tokio::sync::watch`] channel. The engine holds
//! receivers and reads the current value at the moment it needs it, so a
//! change applies to the next evaluation without restarting anything.

use tokio::sync::watch;
use tracing::debug;

use crate::download::constants::{DEFAULT_CONCURRENCY, MAX_CONCURRENCY};

/// Owner of the configuration channels.
///
/// Setters never fail; out of range values are clamped.
#[derive(Debug)]
pub struct Settings {
    download_root: watch::Sender<String>,
    separate_by_collection: watch::Sender<bool>,
    speed_limit: watch::Sender<f64>,
    auto_extract: watch::Sender<bool>,
    concurrency: watch::Sender<usize>,
}

/// Read side of [`Settings`], cloned into the engine.
#[derive(Debug, Clone)]
pub struct SettingsWatch {
    /// Download root; empty means not configured.
    pub download_root: watch::Receiver<String>,
    /// Whether files go into one sub-folder per collection.
    pub separate_by_collection: watch::Receiver<bool>,
    /// Speed cap in MB/s; infinite or non-positive means unlimited.
    pub speed_limit: watch::Receiver<f64>,
    /// Whether archives are extracted after download.
    pub auto_extract: watch::Receiver<bool>,
    /// Simultaneous transfer budget.
    pub concurrency: watch::Receiver<usize>,
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

impl Settings {
    /// Creates settings holding the defaults: no root, no sub-folders,
    /// unlimited speed, auto-extract on, concurrency 3.
    #[must_use]
    pub fn new() -> Self {
        Self {
            download_root: watch::Sender::new(String::new()),
            separate_by_collection: watch::Sender::new(false),
            speed_limit: watch::Sender::new(f64::INFINITY),
            auto_extract: watch::Sender::new(true),
            concurrency: watch::Sender::new(DEFAULT_CONCURRENCY),
        }
    }

    /// Returns receivers for every setting.
    #[must_use]
    pub fn subscribe(&self) -> SettingsWatch {
        SettingsWatch {
            download_root: self.download_root.subscribe(),
            separate_by_collection: self.separate_by_collection.subscribe(),
            speed_limit: self.speed_limit.subscribe(),
            auto_extract: self.auto_extract.subscribe(),
            concurrency: self.concurrency.subscribe(),
        }
    }

    pub fn set_download_root(&self, root: impl Into<String>) {
        let root = root.into();
        debug!(root = %root, "download root changed");
        self.download_root.send_replace(root);
    }

    pub fn set_separate_by_collection(&self, enabled: bool) {
        self.separate_by_collection.send_replace(enabled);
    }

    /// Sets the speed cap in MB/s. NaN is treated as unlimited.
    pub fn set_speed_limit(&self, limit_mbs: f64) {
        let limit = if limit_mbs.is_nan() {
            f64::INFINITY
        } else {
            limit_mbs
        };
        debug!(limit, "speed limit changed");
        self.speed_limit.send_replace(limit);
    }

    pub fn set_auto_extract(&self, enabled: bool) {
        self.auto_extract.send_replace(enabled);
    }

    /// Sets the concurrency budget, clamped to `1..=16`.
    pub fn set_concurrency(&self, concurrency: usize) {
        let concurrency = concurrency.clamp(1, MAX_CONCURRENCY);
        self.concurrency.send_if_modified(|current| {
            if *current == concurrency {
                false
            } else {
                *current = concurrency;
                true
            }
        });
    }
}

impl SettingsWatch {
    /// Current download root.
    #[must_use]
    pub fn download_root(&self) -> String {
        self.download_root.borrow().clone()
    }

    #[must_use]
    pub fn separate_by_collection(&self) -> bool {
        *self.separate_by_collection.borrow()
    }

    #[must_use]
    pub fn speed_limit(&self) -> f64 {
        *self.speed_limit.borrow()
    }

    #[must_use]
    pub fn auto_extract(&self) -> bool {
        *self.auto_extract.borrow()
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        *self.concurrency.borrow()
    }
}
