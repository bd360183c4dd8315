//! Zip adapter.

use zip::ZipArchive;

use super::{EntryStream, ExtractionError, RawEntry};
use crate::storage::StorageSource;

pub(super) struct ZipEntries {
    archive: ZipArchive<StorageSource>,
    archive_name: String,
}

impl ZipEntries {
    pub(super) fn open(source: StorageSource, archive_name: &str) -> Result<Self, ExtractionError> {
        let archive =
            ZipArchive::new(source).map_err(|e| ExtractionError::corrupt(archive_name, e))?;
        Ok(Self {
            archive,
            archive_name: archive_name.to_string(),
        })
    }
}

impl EntryStream for ZipEntries {
    fn for_each_entry(
        &mut self,
        visit: &mut dyn FnMut(RawEntry<'_>) -> Result<(), ExtractionError>,
    ) -> Result<(), ExtractionError> {
        for index in 0..self.archive.len() {
            let mut file = self
                .archive
                .by_index(index)
                .map_err(|e| ExtractionError::corrupt(&self.archive_name, e))?;
            let name = file.name().to_string();
            let is_file = !file.is_dir();
            visit(RawEntry {
                name,
                is_file,
                reader: &mut file,
            })?;
        }
        Ok(())
    }
}
