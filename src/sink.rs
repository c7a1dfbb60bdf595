//! Lifecycle event delivery from the executor to a consumer.
//!
//! A [`ResultSink`] receives the events of one execution. The executor
//! invokes it from the worker task, so sink implementations live on a
//! foreign context relative to the issuer and must never block the worker
//! indefinitely; a sink bound to another context re-marshals events onto it
//! asynchronously. [`ChannelSink`] does exactly that with an unbounded
//! `tokio::sync::mpsc` channel.
//!
//! For each execution, events are delivered in the order
//! Start → Progress* → at most one of Success/Failure → Finish, except that
//! cancellation short-circuits to Cancel (see the `executor` module docs for
//! the accepted race).

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::debug;

use crate::error::RequestError;
use crate::transport::TransportResponse;

/// The body delivered with a terminal Success/Failure event.
///
/// One variant per sink family: in-memory binary, decoded text, a streamed
/// destination file, or absent (failures that never produced a body).
#[derive(Debug, Clone)]
pub enum ResponseBody {
    /// No body is available.
    Empty,
    /// The buffered binary body.
    Bytes(Bytes),
    /// The body decoded as text.
    Text(String),
    /// The destination file the body was streamed to (possibly partial on
    /// failure).
    File(PathBuf),
}

/// One lifecycle event of a single execution, as forwarded by [`ChannelSink`].
#[derive(Debug, Clone)]
pub enum RequestEvent {
    /// The execution started.
    Started,
    /// Body transfer progress.
    Progress {
        /// Bytes transferred so far.
        position: u64,
        /// Total length when the transport advertised one.
        total: Option<u64>,
    },
    /// The execution succeeded.
    Succeeded {
        /// The HTTP status code.
        status: u16,
        /// The response body.
        body: ResponseBody,
    },
    /// The execution failed.
    Failed {
        /// Human-readable failure message (fixed classification string for
        /// fatal transport faults).
        message: String,
        /// The partial or absent body.
        body: ResponseBody,
    },
    /// The execution finished (terminal, after Success or Failure).
    Finished,
    /// The execution was cancelled; no Success/Failure follows.
    Cancelled,
}

/// Receives the lifecycle events of one request execution.
///
/// The six event methods are synchronous and fire-and-forget: they run on
/// the worker task and must return promptly. [`process_response`] is the
/// async hook the executor hands a successful exchange to; the default
/// implementation buffers the whole body and classifies non-2xx status as
/// failure. [`StreamingFileSink`](crate::file_sink::StreamingFileSink)
/// overrides it to stream to disk instead.
///
/// [`process_response`]: ResultSink::process_response
#[async_trait]
pub trait ResultSink: Send + Sync {
    /// The execution started.
    fn on_start(&self) {}

    /// Body transfer progress; `total` is `None` when the length is unknown.
    fn on_progress(&self, _position: u64, _total: Option<u64>) {}

    /// The execution succeeded with the given status and body.
    fn on_success(&self, _status: u16, _body: ResponseBody) {}

    /// The execution failed. `body` carries whatever was transferred before
    /// the failure; `message` is the human-readable classification.
    fn on_failure(&self, _error: &RequestError, _body: ResponseBody, _message: &str) {}

    /// The execution finished; always follows Success/Failure.
    fn on_finish(&self) {}

    /// The execution was cancelled.
    fn on_cancel(&self) {}

    /// Consumes a successful exchange and emits the terminal Success or
    /// Failure event.
    ///
    /// Invoked by the executor only when the execution was not cancelled.
    /// Implementations must emit at most one of Success/Failure.
    async fn process_response(&self, response: TransportResponse) {
        let TransportResponse {
            status, mut body, ..
        } = response;

        let mut buffered = Vec::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => buffered.extend_from_slice(&bytes),
                Err(fault) => {
                    let error = RequestError::stream(fault);
                    let message = error.to_string();
                    self.on_failure(&error, ResponseBody::Bytes(Bytes::from(buffered)), &message);
                    return;
                }
            }
        }

        if status >= 300 {
            let error = RequestError::http_status(status);
            let message = format!("HTTP status {status}");
            self.on_failure(&error, ResponseBody::Bytes(Bytes::from(buffered)), &message);
        } else {
            self.on_success(status, ResponseBody::Bytes(Bytes::from(buffered)));
        }
    }
}

/// A [`ResultSink`] that forwards every event over an unbounded channel.
///
/// The Rust rendition of posting messages to another context's event queue:
/// the worker's `send` never blocks, and the consumer drains
/// [`RequestEvent`]s from the receiver on whatever context it owns.
///
/// # Example
///
/// ```
/// use reqtask::{ChannelSink, RequestEvent, ResultSink};
///
/// let (sink, mut events) = ChannelSink::pair();
/// sink.on_start();
/// assert!(matches!(events.try_recv(), Ok(RequestEvent::Started)));
/// ```
#[derive(Debug)]
pub struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<RequestEvent>,
}

impl ChannelSink {
    /// Creates a sink and the receiver its events arrive on.
    #[must_use]
    pub fn pair() -> (Self, tokio::sync::mpsc::UnboundedReceiver<RequestEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: RequestEvent) {
        // A dropped receiver means the consumer no longer cares; the
        // execution itself carries on.
        if self.tx.send(event).is_err() {
            debug!("event receiver dropped; discarding event");
        }
    }
}

impl ResultSink for ChannelSink {
    fn on_start(&self) {
        self.send(RequestEvent::Started);
    }

    fn on_progress(&self, position: u64, total: Option<u64>) {
        self.send(RequestEvent::Progress { position, total });
    }

    fn on_success(&self, status: u16, body: ResponseBody) {
        self.send(RequestEvent::Succeeded { status, body });
    }

    fn on_failure(&self, _error: &RequestError, body: ResponseBody, message: &str) {
        self.send(RequestEvent::Failed {
            message: message.to_string(),
            body,
        });
    }

    fn on_finish(&self) {
        self.send(RequestEvent::Finished);
    }

    fn on_cancel(&self) {
        self.send(RequestEvent::Cancelled);
    }
}
