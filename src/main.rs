//! CLI entry point for the bulkfetch tool.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod app;
mod app_config;
mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    app::terminal::init_tracing(app::terminal::default_level(args.quiet, args.verbose));
    debug!(?args, "CLI arguments parsed");

    let outcome = app::run(args).await?;
    Ok(outcome.into())
}
