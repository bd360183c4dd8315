//! A single transfer attempt: resolve the destination, open the stream and
//! copy it into storage under the throttle.

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::{ManagerInner, RunContext, StoredDownload};
use crate::catalog::collection_folder_name;
use crate::download::client::ResponseStream;
use crate::download::constants::{BUFFER_SIZE, OCTET_STREAM};
use crate::download::error::DownloadError;
use crate::download::throttle::SpeedThrottle;
use crate::storage::StorageSink;

impl ManagerInner {
    /// One attempt. The partial destination file is deleted on any error.
    #[instrument(level = "debug", skip(self, run), fields(file_name = %run.file.file_name))]
    pub(super) async fn attempt(&self, run: &RunContext) -> Result<StoredDownload, DownloadError> {
        let root = self.settings.download_root();
        if root.trim().is_empty() {
            return Err(DownloadError::RootNotConfigured);
        }
        if !self.storage.is_writable(&root) {
            return Err(DownloadError::root_unavailable(root));
        }

        let response = tokio::select! {
            biased;
            () = run.token.cancelled() => return Err(DownloadError::Cancelled),
            response = self.transport.open(&run.file.download_url) => response?,
        };

        let sub_path = if self.settings.separate_by_collection() {
            collection_folder_name(&run.file.collection_id)
        } else {
            String::new()
        };
        let name = run.file.storage_name();

        let destination = self
            .storage
            .create_file(&root, &sub_path, &name, OCTET_STREAM)
            .ok_or_else(|| DownloadError::storage(&name, "cannot create destination file"))?;
        let Some(sink) = self.storage.open_sink(&destination) else {
            self.storage.delete(&destination);
            return Err(DownloadError::storage(&name, "cannot open destination for writing"));
        };

        match self.copy_body(run, response, sink).await {
            Ok(bytes) => {
                debug!(bytes, destination = %destination, "transfer finished");
                Ok(StoredDownload {
                    root,
                    sub_path,
                    file: destination,
                })
            }
            Err(e) => {
                if !self.storage.delete(&destination) {
                    debug!(destination = %destination, "partial file already gone");
                }
                Err(e)
            }
        }
    }

    /// Copies the body into `sink` in writes of at most [`BUFFER_SIZE`] bytes.
    ///
    /// Returns the number of bytes written. The sink is flushed and closed
    /// on success and dropped on every path.
    async fn copy_body(
        &self,
        run: &RunContext,
        response: ResponseStream,
        mut sink: StorageSink,
    ) -> Result<u64, DownloadError> {
        let file_name = run.file.file_name.as_str();
        let token = &run.token;
        let total = response
            .content_length
            .filter(|len| *len > 0)
            .or((run.file.file_size_bytes > 0).then_some(run.file.file_size_bytes));

        let mut throttle = SpeedThrottle::new(self.settings.speed_limit.clone());
        let mut body = response.body;
        let mut downloaded: u64 = 0;

        loop {
            let next: Option<Result<Bytes, DownloadError>> = tokio::select! {
                biased;
                () = token.cancelled() => return Err(DownloadError::Cancelled),
                next = body.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;

            for piece in chunk.chunks(BUFFER_SIZE) {
                tokio::select! {
                    biased;
                    () = token.cancelled() => return Err(DownloadError::Cancelled),
                    written = sink.write_all(piece) => {
                        written.map_err(|e| DownloadError::io(file_name, e))?;
                    }
                }
                downloaded += piece.len() as u64;
                throttle.record(piece.len(), token).await?;

                if !token.is_cancelled() {
                    self.tracker.update_progress(
                        file_name,
                        fraction(downloaded, total),
                        throttle.current_speed(),
                        downloaded,
                    );
                }
            }
        }

        throttle.finish(token).await?;
        sink.flush()
            .await
            .map_err(|e| DownloadError::io(file_name, e))?;
        sink.shutdown()
            .await
            .map_err(|e| DownloadError::io(file_name, e))?;

        if !token.is_cancelled() {
            self.tracker
                .flush_progress(file_name, 1.0, throttle.current_speed(), downloaded);
        }
        Ok(downloaded)
    }
}

/// `downloaded / total`, or 0 when the total is unknown.
#[allow(clippy::cast_precision_loss)]
fn fraction(downloaded: u64, total: Option<u64>) -> f64 {
    match total {
        Some(total) if total > 0 => (downloaded as f64 / total as f64).min(1.0),
        _ => 0.0,
    }
}
