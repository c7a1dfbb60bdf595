//! A [`ResultSink`] that streams the response body to a file.
//!
//! [`StreamingFileSink`] wraps a consumer-facing sink and replaces the
//! buffering [`process_response`](ResultSink::process_response) with a
//! chunk-by-chunk write to a destination file, emitting progress after every
//! chunk. Streaming keeps large bodies out of memory and gives the consumer
//! incremental progress.
//!
//! Status classification is independent of streaming: a server error
//! response can transfer completely without an I/O fault and is still
//! reported as failure, with the (fully or partially) written file as the
//! body.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::error::RequestError;
use crate::sink::{ResponseBody, ResultSink};
use crate::transport::{BodyStream, TransportResponse};

/// Streams a successful response body to a destination file.
///
/// The destination is created (truncating existing content) when streaming
/// begins and is exclusively owned by the one worker executing the request.
/// All lifecycle events are forwarded to the wrapped consumer sink, with the
/// destination path delivered as the terminal body.
///
/// # Example
///
/// ```no_run
/// use reqtask::{ChannelSink, StreamingFileSink};
///
/// let (consumer, events) = ChannelSink::pair();
/// let sink = StreamingFileSink::new("/tmp/download.bin", Box::new(consumer));
/// ```
pub struct StreamingFileSink {
    path: PathBuf,
    inner: Box<dyn ResultSink>,
}

impl StreamingFileSink {
    /// Creates a file sink writing to `path`, forwarding events to `inner`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, inner: Box<dyn ResultSink>) -> Self {
        Self {
            path: path.into(),
            inner,
        }
    }

    /// Returns the destination path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes the body stream to the destination, emitting progress after
    /// each chunk and a final progress event, then flushes.
    ///
    /// Returns the number of bytes written.
    async fn stream_to_file(
        &self,
        stream: &mut BodyStream,
        total: Option<u64>,
    ) -> Result<u64, RequestError> {
        let file = File::create(&self.path)
            .await
            .map_err(|e| RequestError::io(self.path.clone(), e))?;
        let mut writer = BufWriter::new(file);
        let mut written: u64 = 0;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(RequestError::stream)?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| RequestError::io(self.path.clone(), e))?;
            written += chunk.len() as u64;
            self.inner.on_progress(written, total);
        }

        // Final progress: the advertised total when known, otherwise what
        // was actually written.
        self.inner.on_progress(total.unwrap_or(written), total);

        writer
            .flush()
            .await
            .map_err(|e| RequestError::io(self.path.clone(), e))?;

        Ok(written)
    }
}

#[async_trait]
impl ResultSink for StreamingFileSink {
    fn on_start(&self) {
        self.inner.on_start();
    }

    fn on_progress(&self, position: u64, total: Option<u64>) {
        self.inner.on_progress(position, total);
    }

    fn on_success(&self, status: u16, body: ResponseBody) {
        self.inner.on_success(status, body);
    }

    fn on_failure(&self, error: &RequestError, body: ResponseBody, message: &str) {
        self.inner.on_failure(error, body, message);
    }

    fn on_finish(&self) {
        self.inner.on_finish();
    }

    fn on_cancel(&self) {
        self.inner.on_cancel();
    }

    async fn process_response(&self, response: TransportResponse) {
        let TransportResponse {
            status,
            content_length,
            mut body,
        } = response;

        debug!(status, content_length, path = %self.path.display(), "streaming response body to file");

        match self.stream_to_file(&mut body, content_length).await {
            Err(error) => {
                let message = error.to_string();
                self.inner
                    .on_failure(&error, ResponseBody::File(self.path.clone()), &message);
            }
            Ok(written) => {
                if status >= 300 {
                    let error = RequestError::http_status(status);
                    let message = format!("HTTP status {status}");
                    self.inner
                        .on_failure(&error, ResponseBody::File(self.path.clone()), &message);
                } else {
                    debug!(bytes = written, path = %self.path.display(), "file sink complete");
                    self.inner
                        .on_success(status, ResponseBody::File(self.path.clone()));
                }
            }
        }
    }
}
