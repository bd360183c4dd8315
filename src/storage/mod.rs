//! Storage abstraction used for every file the engine produces.
//!
//! The engine addresses files as `root + relative sub-path + name` and never
//! builds filesystem paths itself. Backends report failures as absence
//! (`None`) and validity checks as booleans; the engine turns those into its
//! own errors with context.

mod fs;

use std::fmt;
use std::io::{Read, Seek};

use tokio::io::AsyncWrite;

pub use fs::FsStorage;

/// Async byte sink for a storage file.
pub type StorageSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Seekable byte source for a storage file.
pub type StorageSource = Box<dyn ReadSeek + Send>;

/// `Read + Seek`, object safe.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Opaque handle to a file known to a storage backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageFile {
    location: String,
    name: String,
}

impl StorageFile {
    /// Creates a handle. `location` is backend specific.
    #[must_use]
    pub fn new(location: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            name: name.into(),
        }
    }

    /// Backend specific location (a path for [`FsStorage`]).
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    /// File name without the sub-path.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for StorageFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location)
    }
}

/// A place the engine can create, read and delete files.
///
/// `sub_path` is a `/`-separated relative path; empty means the root itself.
/// Intermediate segments are created on demand by `create_file`.
pub trait Storage: Send + Sync + fmt::Debug {
    /// True if `root` exists and accepts new files.
    fn is_writable(&self, root: &str) -> bool;

    /// Creates (or truncates) `name` under `root/sub_path`.
    fn create_file(&self, root: &str, sub_path: &str, name: &str, mime: &str)
    -> Option<StorageFile>;

    /// Looks up an existing file.
    fn find_file(&self, root: &str, sub_path: &str, name: &str) -> Option<StorageFile>;

    /// Opens a writer that replaces the file's content.
    fn open_sink(&self, file: &StorageFile) -> Option<StorageSink>;

    /// Opens a seekable reader over the file's content.
    fn open_source(&self, file: &StorageFile) -> Option<StorageSource>;

    /// Deletes the file. Returns false if nothing was deleted.
    fn delete(&self, file: &StorageFile) -> bool;
}

/// Joins two relative sub-paths with `/`, ignoring empty sides.
#[must_use]
pub fn join_sub_path(base: &str, child: &str) -> String {
    let base = base.trim_matches('/');
    let child = child.trim_matches('/');
    match (base.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{child}"),
    }
}
