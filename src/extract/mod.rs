//! Post-download archive extraction.
//!
//! One algorithm serves every format: each format only supplies an
//! [`EntryStream`] adapter that walks its entries in order. The extractor
//! then
//!
//! 1. counts the file entries and fails closed above the entry ceiling,
//! 2. walks the entries again, writing each file under the destination
//!    sub-path with a sanitised relative path (the archive's top folder is
//!    dropped, and a name that is already taken gets a ` (n)` suffix),
//! 3. reports `done / total` after every file,
//! 4. deletes whatever it wrote if anything fails or the token is cancelled.
//!
//! Extraction is blocking work and must run on a Tokio blocking thread
//! (`spawn_blocking`), since output files are written through the storage's
//! async sinks.

mod error;
mod sevenz;
mod tar;
mod zip;

use std::io::{Read, Write};

use tokio::runtime::Handle;
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

pub use error::ExtractionError;

use self::sevenz::SevenZEntries;
use self::tar::TarGzEntries;
use self::zip::ZipEntries;
use crate::download::constants::BUFFER_SIZE;
use crate::storage::{Storage, StorageFile, join_sub_path};

/// Default maximum number of file entries in one archive.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// MIME type for extracted files.
const EXTRACTED_MIME: &str = "application/octet-stream";

/// Supported archive formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    /// `.zip`
    Zip,
    /// `.7z`
    SevenZ,
    /// `.tar.gz` / `.tgz`
    TarGz,
}

impl ArchiveFormat {
    /// Detects the format from a file name or extension, case-insensitively.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else if lower.ends_with(".7z") {
            Some(Self::SevenZ)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else {
            None
        }
    }
}

/// One file written by an extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFile {
    /// Path relative to the destination sub-path, `/`-separated.
    pub relative_path: String,
    /// Storage handle of the written file.
    pub file: StorageFile,
}

/// An archive entry as seen by the shared algorithm.
pub(crate) struct RawEntry<'a> {
    pub(crate) name: String,
    pub(crate) is_file: bool,
    pub(crate) reader: &'a mut dyn Read,
}

/// Format adapter: walks entries in archive order.
pub(crate) trait EntryStream {
    fn for_each_entry(
        &mut self,
        visit: &mut dyn FnMut(RawEntry<'_>) -> Result<(), ExtractionError>,
    ) -> Result<(), ExtractionError>;
}

/// Extracts supported archives through a [`Storage`] backend.
#[derive(Debug, Clone)]
pub struct ArchiveExtractor {
    max_entries: usize,
}

impl Default for ArchiveExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveExtractor {
    /// Creates an extractor with the default entry ceiling.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }

    /// Creates an extractor with a custom entry ceiling.
    #[must_use]
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self { max_entries }
    }

    /// Extracts `archive` into `destination_root/sub_path`.
    ///
    /// Returns the produced files. Archives whose name is not a supported
    /// format produce an empty list.
    ///
    /// # Errors
    ///
    /// Any [`ExtractionError`]; files written before the failure are deleted.
    #[instrument(skip(self, storage, on_progress, cancel), fields(archive = %archive.name()))]
    pub fn extract(
        &self,
        storage: &dyn Storage,
        archive: &StorageFile,
        destination_root: &str,
        sub_path: &str,
        on_progress: &mut dyn FnMut(f64),
        cancel: &CancellationToken,
    ) -> Result<Vec<ExtractedFile>, ExtractionError> {
        let Some(format) = ArchiveFormat::from_name(archive.name()) else {
            debug!("not a supported archive, nothing to extract");
            return Ok(Vec::new());
        };
        self.extract_as(
            format,
            storage,
            archive,
            destination_root,
            sub_path,
            on_progress,
            cancel,
        )
    }

    /// Like [`ArchiveExtractor::extract`] with the format already known.
    ///
    /// # Errors
    ///
    /// Any [`ExtractionError`]; files written before the failure are deleted.
    #[allow(clippy::too_many_arguments)]
    pub fn extract_as(
        &self,
        format: ArchiveFormat,
        storage: &dyn Storage,
        archive: &StorageFile,
        destination_root: &str,
        sub_path: &str,
        on_progress: &mut dyn FnMut(f64),
        cancel: &CancellationToken,
    ) -> Result<Vec<ExtractedFile>, ExtractionError> {
        let total = self.count_files(storage, archive, format)?;
        debug!(?format, total, "archive pre-scan complete");

        let mut produced = Vec::new();
        let outcome = Self::write_entries(
            storage,
            archive,
            format,
            destination_root,
            sub_path,
            total,
            on_progress,
            cancel,
            &mut produced,
        );

        match outcome {
            Ok(()) => {
                info!(files = produced.len(), "archive extracted");
                Ok(produced)
            }
            Err(error) => {
                warn!(error = %error, written = produced.len(), "extraction failed, rolling back");
                for extracted in &produced {
                    storage.delete(&extracted.file);
                }
                Err(error)
            }
        }
    }

    fn open(
        storage: &dyn Storage,
        archive: &StorageFile,
        format: ArchiveFormat,
    ) -> Result<Box<dyn EntryStream>, ExtractionError> {
        let source = storage
            .open_source(archive)
            .ok_or_else(|| ExtractionError::Unreadable {
                archive: archive.name().to_string(),
            })?;
        Ok(match format {
            ArchiveFormat::Zip => Box::new(ZipEntries::open(source, archive.name())?),
            ArchiveFormat::SevenZ => Box::new(SevenZEntries::open(source, archive.name())?),
            ArchiveFormat::TarGz => Box::new(TarGzEntries::open(source, archive.name())),
        })
    }

    fn count_files(
        &self,
        storage: &dyn Storage,
        archive: &StorageFile,
        format: ArchiveFormat,
    ) -> Result<usize, ExtractionError> {
        let mut stream = Self::open(storage, archive, format)?;
        let mut count = 0usize;
        let max = self.max_entries;
        stream.for_each_entry(&mut |entry| {
            if entry.is_file {
                count += 1;
                if count > max {
                    return Err(ExtractionError::TooManyEntries {
                        archive: archive.name().to_string(),
                        count,
                        max,
                    });
                }
            }
            Ok(())
        })?;
        Ok(count)
    }

    #[allow(clippy::too_many_arguments, clippy::cast_precision_loss)]
    fn write_entries(
        storage: &dyn Storage,
        archive: &StorageFile,
        format: ArchiveFormat,
        destination_root: &str,
        sub_path: &str,
        total: usize,
        on_progress: &mut dyn FnMut(f64),
        cancel: &CancellationToken,
        produced: &mut Vec<ExtractedFile>,
    ) -> Result<(), ExtractionError> {
        if total == 0 {
            on_progress(1.0);
            return Ok(());
        }

        let handle = Handle::try_current()
            .map_err(|e| ExtractionError::storage(archive.name(), e.to_string()))?;
        let mut stream = Self::open(storage, archive, format)?;
        let mut done = 0usize;

        stream.for_each_entry(&mut |entry| {
            if cancel.is_cancelled() {
                return Err(ExtractionError::Cancelled);
            }
            if !entry.is_file {
                return Ok(());
            }

            if let Some(relative_path) = output_path(&entry.name) {
                let (relative_path, file) = write_entry(
                    storage,
                    &handle,
                    destination_root,
                    sub_path,
                    &relative_path,
                    entry.reader,
                    cancel,
                )?;
                produced.push(ExtractedFile {
                    relative_path,
                    file,
                });
            } else {
                debug!(entry = %entry.name, "skipping entry with empty sanitised path");
            }

            done += 1;
            on_progress(done as f64 / total as f64);
            Ok(())
        })
    }
}

fn write_entry(
    storage: &dyn Storage,
    handle: &Handle,
    destination_root: &str,
    sub_path: &str,
    relative_path: &str,
    reader: &mut dyn Read,
    cancel: &CancellationToken,
) -> Result<(String, StorageFile), ExtractionError> {
    let (parent, name) = match relative_path.rsplit_once('/') {
        Some((parent, name)) => (parent, name),
        None => ("", relative_path),
    };
    let target_dir = join_sub_path(sub_path, parent);
    let name = free_name(storage, destination_root, &target_dir, name);
    let output = join_sub_path(parent, &name);
    let relative_path = output.as_str();

    let file = storage
        .create_file(destination_root, &target_dir, &name, EXTRACTED_MIME)
        .ok_or_else(|| ExtractionError::storage(relative_path, "cannot create output file"))?;
    let Some(sink) = storage.open_sink(&file) else {
        storage.delete(&file);
        return Err(ExtractionError::storage(relative_path, "cannot open output file"));
    };

    let mut writer = SyncIoBridge::new_with_handle(sink, handle.clone());
    let copied = copy_chunks(reader, &mut writer, cancel)
        .and_then(|()| writer.flush().map_err(CopyError::Io))
        .and_then(|()| writer.shutdown().map_err(CopyError::Io));

    match copied {
        Ok(()) => Ok((relative_path.to_string(), file)),
        Err(e) => {
            drop(writer);
            storage.delete(&file);
            Err(match e {
                CopyError::Cancelled => ExtractionError::Cancelled,
                CopyError::Io(source) => ExtractionError::io(relative_path, source),
            })
        }
    }
}

/// `name`, or `stem (n).ext` with the lowest free `n` when `name` is taken.
fn free_name(storage: &dyn Storage, root: &str, dir: &str, name: &str) -> String {
    if storage.find_file(root, dir, name).is_none() {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => name.split_at(dot),
        _ => (name, ""),
    };
    let mut n = 1u32;
    loop {
        let candidate = format!("{stem} ({n}){ext}");
        if storage.find_file(root, dir, &candidate).is_none() {
            warn!(entry = name, renamed = %candidate, "output name taken, writing under a new name");
            return candidate;
        }
        n += 1;
    }
}

enum CopyError {
    Cancelled,
    Io(std::io::Error),
}

fn copy_chunks(
    reader: &mut dyn Read,
    writer: &mut dyn Write,
    cancel: &CancellationToken,
) -> Result<(), CopyError> {
    let mut buffer = [0u8; BUFFER_SIZE];
    loop {
        if cancel.is_cancelled() {
            return Err(CopyError::Cancelled);
        }
        let read = match reader.read(&mut buffer) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Io(e)),
        };
        writer.write_all(&buffer[..read]).map_err(CopyError::Io)?;
    }
}

/// Output path for an entry: sanitised, with the top-level folder removed
/// when the path has more than one segment. `None` if nothing is left.
fn output_path(entry_name: &str) -> Option<String> {
    let sanitized = sanitize_entry_path(entry_name);
    if sanitized.is_empty() {
        return None;
    }
    match sanitized.split_once('/') {
        Some((_, rest)) => Some(rest.to_string()),
        None => Some(sanitized),
    }
}

/// Normalises an archive entry name into a safe relative path.
///
/// Backslashes are separators; `.`, `..` and empty segments are dropped;
/// `< > : " | ? *` and control characters become `_`.
#[must_use]
pub fn sanitize_entry_path(entry_name: &str) -> String {
    entry_name
        .split(['/', '\\'])
        .filter(|segment| !matches!(*segment, "" | "." | ".."))
        .map(sanitize_segment)
        .collect::<Vec<_>>()
        .join("/")
}

fn sanitize_segment(segment: &str) -> String {
    segment
        .chars()
        .map(|c| {
            if matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*') || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect()
}
