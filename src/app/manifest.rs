//! Download records from a JSON manifest or from bare URLs.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use bulkfetch_core::DownloadableFile;
use bulkfetch_core::catalog::{decode_file_name, extension_of};
use tracing::warn;
use url::Url;

/// Reads a JSON array of download records.
///
/// Records without an extension get one derived from their file name.
pub(crate) fn load_manifest(path: &Path) -> Result<Vec<DownloadableFile>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest '{}'", path.display()))?;
    parse_manifest(&raw).with_context(|| format!("Failed to parse manifest '{}'", path.display()))
}

fn parse_manifest(raw: &str) -> Result<Vec<DownloadableFile>> {
    let mut records: Vec<DownloadableFile> = serde_json::from_str(raw)?;
    for record in &mut records {
        if record.file_name.trim().is_empty() {
            bail!("Record for '{}' has an empty file_name", record.download_url);
        }
        if record.file_extension.is_empty() {
            record.file_extension = extension_of(&record.file_name);
        }
    }
    Ok(records)
}

/// Builds a record from a URL; the file name is the last path segment.
pub(crate) fn record_from_url(raw: &str) -> Result<DownloadableFile> {
    let url = Url::parse(raw).with_context(|| format!("Invalid URL '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("Unsupported URL scheme '{}' in '{raw}'", url.scheme());
    }
    let Some(file_name) = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
    else {
        bail!("URL '{raw}' has no file name");
    };
    let display_name = decode_file_name(file_name);
    Ok(DownloadableFile::new(display_name, file_name, url.as_str()))
}

/// Drops records whose `file_name` was already seen, keeping the first.
pub(crate) fn dedupe(records: Vec<DownloadableFile>) -> Vec<DownloadableFile> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| {
            let fresh = seen.insert(record.file_name.clone());
            if !fresh {
                warn!(file_name = %record.file_name, "duplicate record skipped");
            }
            fresh
        })
        .collect()
}
