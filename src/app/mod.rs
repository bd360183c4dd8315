//! Command-line application: resolves the run configuration, starts every
//! download and follows them until they settle.

pub(crate) mod config_runtime;
pub(crate) mod exit_handler;
pub(crate) mod manifest;
pub(crate) mod progress_manager;
pub(crate) mod terminal;

use std::io::{self, IsTerminal};
use std::sync::Arc;

use anyhow::{Context, Result};
use bulkfetch_core::{
    DownloadManager, DownloadableFile, EngineError, EngineOptions, FsStorage, HttpClient, Settings,
};
use tracing::{debug, info, warn};

use self::config_runtime::RunConfig;
use self::exit_handler::{ProcessExit, RunSummary, determine_exit_outcome};
use crate::app_config::load_config;
use crate::cli::Args;

/// Runs one batch of downloads to completion.
pub(crate) async fn run(args: Args) -> Result<ProcessExit> {
    let loaded = load_config(args.config.as_deref())?;
    if let Some(path) = loaded.path.as_deref().filter(|_| loaded.config.is_some()) {
        debug!(path = %path.display(), "config file loaded");
    }
    let config = RunConfig::resolve(&args, loaded.config.as_ref());
    debug!(?config, "run configuration resolved");

    let records = collect_records(&args)?;
    if records.is_empty() {
        info!("Nothing to download. Pass URLs or --manifest <FILE>.");
        return Ok(ProcessExit::Success);
    }

    tokio::fs::create_dir_all(&config.download_dir)
        .await
        .with_context(|| {
            format!(
                "Failed to create download directory '{}'",
                config.download_dir.display()
            )
        })?;

    let settings = Settings::new();
    config.apply(&settings);
    let manager = DownloadManager::new(
        Arc::new(HttpClient::new_with_timeouts(
            config.connect_timeout_secs,
            config.read_timeout_secs,
        )),
        Arc::new(FsStorage::new()),
        settings.subscribe(),
        EngineOptions::default(),
    );

    let total = records.len();
    for record in records {
        match manager.start_download(record) {
            Ok(()) => {}
            Err(EngineError::AlreadyActive { file_name }) => {
                warn!(%file_name, "download already running, skipped");
            }
        }
    }
    info!(total, dir = %config.download_dir.display(), "downloads started");

    let interrupt = manager.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping downloads");
            interrupt.cancel_all();
        }
    });

    let draw = terminal::should_draw_bars(
        io::stderr().is_terminal(),
        args.quiet,
        terminal::is_dumb_terminal(),
    );
    progress_manager::follow_downloads(manager.observe(), draw).await;

    let summary = RunSummary::from_items(&manager.downloads());
    info!(
        completed = summary.completed,
        failed = summary.failed,
        stopped = summary.stopped,
        retried = manager.stats().retried(),
        "Download complete"
    );
    Ok(determine_exit_outcome(summary))
}

fn collect_records(args: &Args) -> Result<Vec<DownloadableFile>> {
    let mut records = match args.manifest.as_deref() {
        Some(path) => manifest::load_manifest(path)?,
        None => Vec::new(),
    };
    for url in &args.urls {
        records.push(manifest::record_from_url(url)?);
    }
    Ok(manifest::dedupe(records))
}
