//! User-Agent string sent with every download request.
//!
//! Some mirrors reject anonymous clients, so the tool always identifies itself.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/bulkfetch";

/// Default User-Agent for download requests.
#[must_use]
pub(crate) fn default_download_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("bulkfetch/{version} (bulk-download-tool; +{PROJECT_UA_URL})")
}
