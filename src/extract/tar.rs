//! Gzip-compressed tar adapter.

use flate2::read::GzDecoder;
use tar::Archive;

use super::{EntryStream, ExtractionError, RawEntry};
use crate::storage::StorageSource;

pub(super) struct TarGzEntries {
    archive: Archive<GzDecoder<StorageSource>>,
    archive_name: String,
}

impl TarGzEntries {
    pub(super) fn open(source: StorageSource, archive_name: &str) -> Self {
        Self {
            archive: Archive::new(GzDecoder::new(source)),
            archive_name: archive_name.to_string(),
        }
    }
}

impl EntryStream for TarGzEntries {
    fn for_each_entry(
        &mut self,
        visit: &mut dyn FnMut(RawEntry<'_>) -> Result<(), ExtractionError>,
    ) -> Result<(), ExtractionError> {
        let entries = self
            .archive
            .entries()
            .map_err(|e| ExtractionError::corrupt(&self.archive_name, e))?;
        for entry in entries {
            let mut entry = entry.map_err(|e| ExtractionError::corrupt(&self.archive_name, e))?;
            let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
            let is_file = entry.header().entry_type().is_file();
            visit(RawEntry {
                name,
                is_file,
                reader: &mut entry,
            })?;
        }
        Ok(())
    }
}
