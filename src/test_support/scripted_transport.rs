//! [`Transport`] that replays scripted responses and records every open.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::time::Instant;

use crate::download::{DownloadError, ResponseStream, Transport};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Success with the given body, split into chunks of `chunk` bytes.
    Body {
        content_length: Option<u64>,
        body: Vec<u8>,
        chunk: usize,
    },
    /// Fails with this HTTP status.
    Status(u16),
    /// Opens, then never yields a byte.
    Hang { content_length: Option<u64> },
}

impl Reply {
    /// Body with a correct content length, sent in 8 KiB chunks.
    #[must_use]
    pub fn body(body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        Self::Body {
            content_length: Some(body.len() as u64),
            body,
            chunk: 8192,
        }
    }
}

/// Replies are consumed in order per URL; the last one repeats.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    opens: Mutex<Vec<(String, Instant)>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends replies for `url`.
    pub fn script(&self, url: &str, replies: impl IntoIterator<Item = Reply>) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(url.to_string())
            .or_default()
            .extend(replies);
    }

    /// Every open so far, with its instant.
    #[must_use]
    pub fn opens(&self) -> Vec<(String, Instant)> {
        self.opens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_reply(&self, url: &str) -> Option<Reply> {
        let mut replies = self.replies.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = replies.get_mut(url)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, url: &str) -> Result<ResponseStream, DownloadError> {
        self.opens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((url.to_string(), Instant::now()));

        match self.next_reply(url) {
            Some(Reply::Body {
                content_length,
                body,
                chunk,
            }) => {
                let chunks = body
                    .chunks(chunk.max(1))
                    .map(Bytes::copy_from_slice)
                    .collect();
                Ok(ResponseStream::from_chunks(content_length, chunks))
            }
            Some(Reply::Status(status)) => Err(DownloadError::http_status(url, status)),
            Some(Reply::Hang { content_length }) => Ok(ResponseStream {
                content_length,
                body: futures_util::stream::pending().boxed(),
            }),
            None => Err(DownloadError::http_status(url, 404)),
        }
    }
}
