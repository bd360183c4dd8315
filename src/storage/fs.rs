//! Local filesystem backend.

use std::fs::{self, OpenOptions};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use super::{Storage, StorageFile, StorageSink, StorageSource};

/// [`Storage`] over local directories. The root is a directory path.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsStorage;

impl FsStorage {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn resolve_dir(root: &str, sub_path: &str) -> PathBuf {
        let mut dir = PathBuf::from(root);
        for segment in sub_path.split('/') {
            if is_plain_segment(segment) {
                dir.push(segment);
            }
        }
        dir
    }
}

/// True for a single normal path component (no separators, no `.`/`..`).
fn is_plain_segment(segment: &str) -> bool {
    let mut components = Path::new(segment).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

impl Storage for FsStorage {
    fn is_writable(&self, root: &str) -> bool {
        if root.is_empty() {
            return false;
        }
        match fs::metadata(root) {
            Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
            Err(_) => false,
        }
    }

    fn create_file(
        &self,
        root: &str,
        sub_path: &str,
        name: &str,
        mime: &str,
    ) -> Option<StorageFile> {
        if !is_plain_segment(name) {
            warn!(name, "refusing to create file with a path-like name");
            return None;
        }
        let dir = Self::resolve_dir(root, sub_path);
        if let Err(e) = fs::create_dir_all(&dir) {
            warn!(dir = %dir.display(), error = %e, "cannot create directory");
            return None;
        }
        let path = dir.join(name);
        match OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
        {
            Ok(_) => {
                debug!(path = %path.display(), mime, "created file");
                Some(StorageFile::new(path.to_string_lossy(), name))
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot create file");
                None
            }
        }
    }

    fn find_file(&self, root: &str, sub_path: &str, name: &str) -> Option<StorageFile> {
        if !is_plain_segment(name) {
            return None;
        }
        let path = Self::resolve_dir(root, sub_path).join(name);
        path.is_file()
            .then(|| StorageFile::new(path.to_string_lossy(), name))
    }

    fn open_sink(&self, file: &StorageFile) -> Option<StorageSink> {
        let std_file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(file.location())
            .ok()?;
        Some(Box::new(tokio::fs::File::from_std(std_file)))
    }

    fn open_source(&self, file: &StorageFile) -> Option<StorageSource> {
        let std_file = fs::File::open(file.location()).ok()?;
        Some(Box::new(std_file))
    }

    fn delete(&self, file: &StorageFile) -> bool {
        match fs::remove_file(file.location()) {
            Ok(()) => true,
            Err(e) => {
                debug!(file = %file, error = %e, "delete failed");
                false
            }
        }
    }
}
