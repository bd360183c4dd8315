//! In-memory [`Storage`] for engine tests that must not touch the disk.

use std::collections::BTreeMap;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::io::AsyncWrite;

use crate::storage::{Storage, StorageFile, StorageSink, StorageSource, join_sub_path};

/// Root name that reports as not writable.
pub const UNWRITABLE_ROOT: &str = "readonly";

type Buffer = Arc<Mutex<Vec<u8>>>;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<BTreeMap<String, Buffer>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored location, sorted.
    #[must_use]
    pub fn locations(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Content stored at `location`.
    #[must_use]
    pub fn contents(&self, location: &str) -> Option<Vec<u8>> {
        self.lock()
            .get(location)
            .map(|buffer| buffer.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    /// Stores a file directly, returning its handle.
    pub fn insert(&self, root: &str, sub_path: &str, name: &str, content: &[u8]) -> StorageFile {
        let location = location(root, sub_path, name);
        self.lock()
            .insert(location.clone(), Arc::new(Mutex::new(content.to_vec())));
        StorageFile::new(location, name)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Buffer>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn location(root: &str, sub_path: &str, name: &str) -> String {
    join_sub_path(&join_sub_path(root, sub_path), name)
}

impl Storage for MemoryStorage {
    fn is_writable(&self, root: &str) -> bool {
        !root.is_empty() && root != UNWRITABLE_ROOT
    }

    fn create_file(&self, root: &str, sub_path: &str, name: &str, _mime: &str) -> Option<StorageFile> {
        Some(self.insert(root, sub_path, name, &[]))
    }

    fn find_file(&self, root: &str, sub_path: &str, name: &str) -> Option<StorageFile> {
        let location = location(root, sub_path, name);
        self.lock()
            .contains_key(&location)
            .then(|| StorageFile::new(location, name))
    }

    fn open_sink(&self, file: &StorageFile) -> Option<StorageSink> {
        let buffer = Arc::clone(self.lock().get(file.location())?);
        buffer.lock().unwrap_or_else(PoisonError::into_inner).clear();
        Some(Box::new(MemorySink { buffer }))
    }

    fn open_source(&self, file: &StorageFile) -> Option<StorageSource> {
        let content = self.contents(file.location())?;
        Some(Box::new(Cursor::new(content)))
    }

    fn delete(&self, file: &StorageFile) -> bool {
        self.lock().remove(file.location()).is_some()
    }
}

struct MemorySink {
    buffer: Buffer,
}

impl AsyncWrite for MemorySink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
