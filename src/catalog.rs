//! Download records supplied by the catalog.
//!
//! The engine only reads these records; it never writes back to the catalog.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Folder name used when a record carries no collection id.
pub const UNKNOWN_COLLECTION: &str = "Unknown";

/// Immutable descriptor of a remote artifact to download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadableFile {
    /// Human readable name shown to observers.
    pub display_name: String,
    /// Original file name, possibly URL-encoded. Keys the download.
    pub file_name: String,
    /// Id of the collection (console, category, ...) the file belongs to.
    #[serde(default)]
    pub collection_id: String,
    /// Source URL.
    pub download_url: String,
    /// Authoritative size if known, else 0.
    #[serde(default)]
    pub file_size_bytes: u64,
    /// Extension including the leading dot, e.g. `.zip`.
    #[serde(default)]
    pub file_extension: String,
}

impl DownloadableFile {
    /// Creates a record, deriving the extension from `file_name`.
    #[must_use]
    pub fn new(
        display_name: impl Into<String>,
        file_name: impl Into<String>,
        download_url: impl Into<String>,
    ) -> Self {
        let file_name = file_name.into();
        let file_extension = extension_of(&file_name);
        Self {
            display_name: display_name.into(),
            file_name,
            collection_id: String::new(),
            download_url: download_url.into(),
            file_size_bytes: 0,
            file_extension,
        }
    }

    /// Sets the collection id.
    #[must_use]
    pub fn with_collection(mut self, collection_id: impl Into<String>) -> Self {
        self.collection_id = collection_id.into();
        self
    }

    /// Sets the catalog size.
    #[must_use]
    pub fn with_size(mut self, file_size_bytes: u64) -> Self {
        self.file_size_bytes = file_size_bytes;
        self
    }

    /// Name the artifact is stored under (URL-decoded `file_name`).
    #[must_use]
    pub fn storage_name(&self) -> String {
        decode_file_name(&self.file_name)
    }
}

/// Returns the extension of `file_name` including the dot, or an empty string.
///
/// Compound `.tar.gz` is kept whole so archive sniffing sees it.
#[must_use]
pub fn extension_of(file_name: &str) -> String {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".tar.gz") {
        return file_name[file_name.len() - ".tar.gz".len()..].to_string();
    }
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => file_name[idx..].to_string(),
        _ => String::new(),
    }
}

/// URL-decodes a catalog file name, falling back to the raw value.
#[must_use]
pub fn decode_file_name(file_name: &str) -> String {
    match urlencoding::decode(file_name) {
        Ok(decoded) => decoded.into_owned(),
        Err(e) => {
            debug!(file_name, error = %e, "file name is not valid percent-encoding, using raw name");
            file_name.to_string()
        }
    }
}

/// Folder name for a collection id.
///
/// Everything after the first underscore is the collection name; remaining
/// underscores become spaces and each word is capitalised.
#[must_use]
pub fn collection_folder_name(collection_id: &str) -> String {
    let trimmed = collection_id.trim();
    if trimmed.is_empty() {
        return UNKNOWN_COLLECTION.to_string();
    }

    let name = trimmed.split_once('_').map_or(trimmed, |(_, rest)| rest);
    let words: Vec<String> = name
        .split('_')
        .filter(|word| !word.is_empty())
        .map(capitalize)
        .collect();

    if words.is_empty() {
        UNKNOWN_COLLECTION.to_string()
    } else {
        words.join(" ")
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_folder_name_drops_manufacturer_prefix() {
        assert_eq!(collection_folder_name("sony_playstation_2"), "Playstation 2");
        assert_eq!(collection_folder_name("nintendo_game_boy"), "Game Boy");
    }

    #[test]
    fn test_collection_folder_name_without_underscore() {
        assert_eq!(collection_folder_name("arcade"), "Arcade");
    }

    #[test]
    fn test_collection_folder_name_empty_is_unknown() {
        assert_eq!(collection_folder_name(""), UNKNOWN_COLLECTION);
        assert_eq!(collection_folder_name("   "), UNKNOWN_COLLECTION);
        assert_eq!(collection_folder_name("sega_"), UNKNOWN_COLLECTION);
    }

    #[test]
    fn test_decode_file_name_percent_encoded() {
        assert_eq!(decode_file_name("Super%20Game%20%28USA%29.zip"), "Super Game (USA).zip");
    }

    #[test]
    fn test_decode_file_name_invalid_utf8_keeps_raw() {
        assert_eq!(decode_file_name("bad%FFname.zip"), "bad%FFname.zip");
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("game.zip"), ".zip");
        assert_eq!(extension_of("pack.TAR.GZ"), ".TAR.GZ");
        assert_eq!(extension_of("noext"), "");
        assert_eq!(extension_of(".hidden"), "");
    }

    #[test]
    fn test_manifest_record_defaults() {
        let json = r#"{"display_name":"Game","file_name":"game.zip","download_url":"https://example.com/game.zip"}"#;
        let record: DownloadableFile = serde_json::from_str(json).unwrap();
        assert_eq!(record.file_size_bytes, 0);
        assert!(record.collection_id.is_empty());
        assert!(record.file_extension.is_empty());
    }
}
