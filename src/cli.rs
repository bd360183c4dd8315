//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Queue large HTTP downloads into a local library.
///
/// Bulkfetch streams every requested file into the download directory with
/// bounded concurrency and an optional shared speed limit, retries transient
/// failures and unpacks zip, 7z and tar.gz archives once they land.
#[derive(Parser, Debug)]
#[command(name = "bulkfetch")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download (the file name is the last path segment)
    pub urls: Vec<String>,

    /// JSON manifest with a list of download records
    #[arg(short, long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Download directory (overrides the config file)
    #[arg(short = 'd', long = "dir", value_name = "DIR")]
    pub download_dir: Option<PathBuf>,

    /// Maximum concurrent downloads (1-16)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=16))]
    pub concurrency: Option<u8>,

    /// Shared speed limit in MB/s (0 for unlimited)
    #[arg(short = 's', long, value_parser = parse_speed_limit)]
    pub speed_limit: Option<f64>,

    /// Keep archives instead of extracting them
    #[arg(long)]
    pub no_extract: bool,

    /// Store each file under a folder named after its collection
    #[arg(long)]
    pub separate_by_collection: bool,

    /// Config file to use instead of the default location
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

fn parse_speed_limit(raw: &str) -> Result<f64, String> {
    let value: f64 = raw
        .parse()
        .map_err(|_| format!("'{raw}' is not a number"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("speed limit must be >= 0, got {raw}"));
    }
    Ok(value)
}
