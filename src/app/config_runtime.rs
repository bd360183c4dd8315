//! Layers built-in defaults, the config file and command-line flags.

use std::path::PathBuf;

use bulkfetch_core::Settings;
use bulkfetch_core::download::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use bulkfetch_core::DEFAULT_CONCURRENCY;

use crate::app_config::FileConfig;
use crate::cli::Args;

/// Effective settings for one run.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RunConfig {
    pub(crate) download_dir: PathBuf,
    pub(crate) concurrency: usize,
    /// MB/s; 0 means unlimited.
    pub(crate) speed_limit: f64,
    pub(crate) auto_extract: bool,
    pub(crate) separate_by_collection: bool,
    pub(crate) connect_timeout_secs: u64,
    pub(crate) read_timeout_secs: u64,
}

impl RunConfig {
    /// Flags win over the file, the file wins over defaults.
    pub(crate) fn resolve(args: &Args, file: Option<&FileConfig>) -> Self {
        let file = file.cloned().unwrap_or_default();
        Self {
            download_dir: args
                .download_dir
                .clone()
                .or(file.download_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            concurrency: args
                .concurrency
                .or(file.concurrency)
                .map_or(DEFAULT_CONCURRENCY, usize::from),
            speed_limit: args.speed_limit.or(file.speed_limit).unwrap_or(0.0),
            auto_extract: !args.no_extract && file.auto_extract.unwrap_or(true),
            separate_by_collection: args.separate_by_collection
                || file.separate_by_collection.unwrap_or(false),
            connect_timeout_secs: file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
            read_timeout_secs: file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
        }
    }

    /// Pushes the engine-facing values into `settings`.
    pub(crate) fn apply(&self, settings: &Settings) {
        settings.set_download_root(self.download_dir.to_string_lossy().into_owned());
        settings.set_concurrency(self.concurrency);
        settings.set_speed_limit(if self.speed_limit > 0.0 {
            self.speed_limit
        } else {
            f64::INFINITY
        });
        settings.set_auto_extract(self.auto_extract);
        settings.set_separate_by_collection(self.separate_by_collection);
    }
}
