//! Asynchronous HTTP request execution with retry, cancellation, and
//! lifecycle events.
//!
//! This library issues a single HTTP request off the caller's thread,
//! applies a configurable retry policy to transient network failures,
//! supports cooperative cancellation, and delivers lifecycle events
//! (start, progress, success, failure, finish, cancel) to a caller-supplied
//! sink without blocking the issuing thread.
//!
//! # Architecture
//!
//! - [`request`] - Immutable request descriptors
//! - [`transport`] - The network exchange interface, its closed fault
//!   taxonomy, and the reqwest-backed implementation
//! - [`retry`] - Pluggable retry policy and fault classification
//! - [`executor`] - The per-request execution/retry state machine
//! - [`sink`] - The lifecycle event contract and a channel-backed sink
//! - [`file_sink`] - Streaming a response body to a file with progress
//! - [`handle`] - Revocable, non-owning handles for cancellation/polling
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use reqtask::{
//!     BackoffPolicy, ChannelSink, ReqwestTransport, RequestDescriptor, RequestExecutor,
//!     RequestEvent, StreamingFileSink,
//! };
//!
//! # async fn example() {
//! let (consumer, mut events) = ChannelSink::pair();
//! let sink = StreamingFileSink::new("./download.bin", Box::new(consumer));
//!
//! let handle = RequestExecutor::spawn(
//!     RequestDescriptor::get("https://example.com/large-file.bin"),
//!     Arc::new(ReqwestTransport::new()),
//!     Arc::new(BackoffPolicy::default()),
//!     Arc::new(sink),
//! );
//!
//! while let Some(event) = events.recv().await {
//!     if let RequestEvent::Progress { position, total } = event {
//!         println!("{position} / {total:?}");
//!     }
//! }
//! assert!(handle.is_finished());
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod executor;
pub mod file_sink;
pub mod handle;
pub mod request;
pub mod retry;
pub mod sink;
pub mod transport;

// Re-export commonly used types
pub use error::RequestError;
pub use executor::RequestExecutor;
pub use file_sink::StreamingFileSink;
pub use handle::RequestHandle;
pub use request::RequestDescriptor;
pub use retry::{
    BackoffPolicy, DEFAULT_MAX_RETRIES, FaultClass, RetryDecision, RetryPolicy, classify_fault,
};
pub use sink::{ChannelSink, RequestEvent, ResponseBody, ResultSink};
pub use transport::{
    BodyStream, ReqwestTransport, Transport, TransportError, TransportResponse,
};
