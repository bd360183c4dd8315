//! Archive builders and engine helpers.

use std::io::{Cursor, Write};
use std::path::Path;
use std::time::Duration;

use bulkfetch_core::{DownloadManager, DownloadStatus, EngineOptions, RetryPolicy};
use flate2::Compression;
use flate2::write::GzEncoder;
use sevenz_rust2::{ArchiveEntry, ArchiveWriter};
use zip::write::SimpleFileOptions;

/// Zip with the given entries; `None` content makes a directory entry.
pub fn zip_bytes(entries: &[(&str, Option<&[u8]>)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, content) in entries {
        match content {
            Some(content) => {
                writer.start_file(*name, options).unwrap();
                writer.write_all(content).unwrap();
            }
            None => writer.add_directory(*name, options).unwrap(),
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Gzip-compressed tar with the given entries; `None` content makes a directory entry.
pub fn tar_gz_bytes(entries: &[(&str, Option<&[u8]>)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        match content {
            Some(content) => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                builder.append_data(&mut header, name, *content).unwrap();
            }
            None => {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
                header.set_mode(0o755);
                builder
                    .append_data(&mut header, name, std::io::empty())
                    .unwrap();
            }
        }
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// 7z archive with the given entries; `None` content makes a directory entry.
pub fn sevenz_bytes(entries: &[(&str, Option<&[u8]>)]) -> Vec<u8> {
    let mut writer = ArchiveWriter::new(Cursor::new(Vec::new())).unwrap();
    for (name, content) in entries {
        match content {
            Some(content) => {
                writer
                    .push_archive_entry(ArchiveEntry::new_file(name), Some(*content))
                    .unwrap();
            }
            None => {
                writer
                    .push_archive_entry::<&[u8]>(
                        ArchiveEntry::new_directory(name.trim_end_matches('/')),
                        None,
                    )
                    .unwrap();
            }
        }
    }
    writer.finish().unwrap().into_inner()
}

/// Zip holding `count` one-byte files under a `t/` folder.
pub fn numbered_zip_bytes(count: usize) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for index in 0..count {
        writer.start_file(format!("t/{index}.txt"), options).unwrap();
        writer.write_all(b"x").unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Options without admission delays and with millisecond backoff.
pub fn fast_options() -> EngineOptions {
    EngineOptions {
        admission_delay: Duration::ZERO,
        retry_admission_delay: Duration::ZERO,
        retry_policy: RetryPolicy::new(3, Duration::from_millis(10)),
        progress_interval: Duration::ZERO,
        ..EngineOptions::default()
    }
}

/// Waits until `file_name` reaches `status`, failing after 30 s.
pub async fn wait_for_status(manager: &DownloadManager, file_name: &str, status: DownloadStatus) {
    let mut items = manager.observe();
    let reached = tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            if items
                .borrow_and_update()
                .iter()
                .any(|item| item.file_name == file_name && item.status == status)
            {
                return true;
            }
            if items.changed().await.is_err() {
                return false;
            }
        }
    })
    .await;
    assert!(
        matches!(reached, Ok(true)),
        "{file_name} never became {status}: {:?}",
        manager.tracker().get(file_name)
    );
}

/// Polls `condition` every 10 ms for up to 10 s.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached");
}

/// Relative paths of every regular file under `root`, sorted, `/`-separated.
pub fn files_under(root: &Path) -> Vec<String> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<String>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                walk(&path, root, out);
            } else {
                let relative = path.strip_prefix(root).unwrap();
                let parts: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                out.push(parts.join("/"));
            }
        }
    }
    let mut out = Vec::new();
    walk(root, root, &mut out);
    out.sort();
    out
}
