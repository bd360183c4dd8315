//! 7z adapter.

use sevenz_rust2::{ArchiveReader, Password};

use super::{EntryStream, ExtractionError, RawEntry};
use crate::storage::StorageSource;

pub(super) struct SevenZEntries {
    archive: ArchiveReader<StorageSource>,
    archive_name: String,
}

impl SevenZEntries {
    pub(super) fn open(source: StorageSource, archive_name: &str) -> Result<Self, ExtractionError> {
        let archive = ArchiveReader::new(source, Password::empty())
            .map_err(|e| ExtractionError::corrupt(archive_name, e))?;
        Ok(Self {
            archive,
            archive_name: archive_name.to_string(),
        })
    }
}

impl EntryStream for SevenZEntries {
    fn for_each_entry(
        &mut self,
        visit: &mut dyn FnMut(RawEntry<'_>) -> Result<(), ExtractionError>,
    ) -> Result<(), ExtractionError> {
        // The decoder drives the walk; a visitor error stops it and is
        // reported instead of the decoder's result.
        let mut stopped: Option<ExtractionError> = None;
        let walked = self.archive.for_each_entries(|entry, reader| {
            match visit(RawEntry {
                name: entry.name().to_string(),
                is_file: !entry.is_directory(),
                reader,
            }) {
                Ok(()) => Ok(true),
                Err(e) => {
                    stopped = Some(e);
                    Ok(false)
                }
            }
        });
        if let Some(error) = stopped {
            return Err(error);
        }
        walked.map_err(|e| ExtractionError::corrupt(&self.archive_name, e))
    }
}
