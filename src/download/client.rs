//! HTTP transport for streaming downloads.
//!
//! The download manager talks to the network only through the [`Transport`]
//! trait. [`HttpClient`] is the production implementation; tests substitute
//! scripted transports.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::Client;
use reqwest::header::{ACCEPT_ENCODING, CONNECTION, HeaderMap, HeaderValue};
use tracing::{debug, instrument};

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent;

/// An opened response body.
pub struct ResponseStream {
    /// Declared content length, if the server sent one.
    pub content_length: Option<u64>,
    /// Body chunks in arrival order.
    pub body: BoxStream<'static, Result<Bytes, DownloadError>>,
}

impl fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl ResponseStream {
    /// Wraps an in-memory chunk list, mainly for scripted transports.
    #[must_use]
    pub fn from_chunks(content_length: Option<u64>, chunks: Vec<Bytes>) -> Self {
        Self {
            content_length,
            body: futures_util::stream::iter(chunks.into_iter().map(Ok)).boxed(),
        }
    }
}

/// Opens streaming GET requests.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Opens `url`, failing unless the final response status is 200.
    async fn open(&self, url: &str) -> Result<ResponseStream, DownloadError>;
}

/// HTTP client for downloading files with streaming support.
///
/// This client is designed to be created once and reused for every download,
/// taking advantage of connection pooling.
///
/// # Example
///
/// ```no_run
/// use bulkfetch_core::download::{HttpClient, Transport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let response = client.open("https://example.com/game.zip").await?;
/// println!("size: {:?}", response.content_length);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 60 seconds between bytes
    /// - No transfer encoding negotiation (`Accept-Encoding: identity`)
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = build_client(connect_timeout_secs, read_timeout_secs)
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpClient {
    #[instrument(level = "debug", skip(self))]
    async fn open(&self, url: &str) -> Result<ResponseStream, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let content_length = response.content_length();
        debug!(url, ?content_length, "response opened");

        let owned_url = url.to_string();
        let body = response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| map_reqwest_error(&owned_url, e)))
            .boxed();

        Ok(ResponseStream {
            content_length,
            body,
        })
    }
}

fn map_reqwest_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

fn build_client(connect_timeout_secs: u64, read_timeout_secs: u64) -> Result<Client, reqwest::Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .read_timeout(Duration::from_secs(read_timeout_secs))
        .default_headers(headers)
        .user_agent(user_agent::default_download_user_agent())
        .build()
}
