//! Transport interface and the reqwest-backed implementation.
//!
//! The executor never talks to the network directly; it drives a
//! [`Transport`], which performs one request/response exchange and reports
//! faults through the closed [`TransportError`] variant set. The executor
//! switches over those variants to decide retry vs. fatal, so transports must
//! map their native errors into this taxonomy rather than invent their own.
//!
//! [`ReqwestTransport`] is the production implementation over a pooled
//! `reqwest::Client`. Tests substitute scripted transports.

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use tracing::debug;

use crate::request::RequestDescriptor;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large bodies).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// A streamed response body: chunks of bytes, each of which may fail.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Transport-level faults for one exchange.
///
/// A closed variant set: the executor classifies each variant as fatal or
/// retryable ([`classify_fault`](crate::retry::classify_fault)) instead of
/// branching on concrete error types.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Protocol-contract violation; the request cannot be repeated.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Host name resolution failed.
    #[error("failed to resolve host: {0}")]
    Resolve(String),

    /// The connection could not be established in time.
    #[error("connect timed out: {0}")]
    ConnectTimeout(String),

    /// Socket-level failure (connection refused/reset, host unreachable).
    #[error("socket error: {0}")]
    Socket(String),

    /// The response was not received in time.
    #[error("read timed out: {0}")]
    ReadTimeout(String),

    /// Any other transport-level I/O failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// An internal transport invariant was violated.
    ///
    /// Normalized to [`TransportError::Io`] by the executor before it
    /// reaches the retry policy, so policies only ever see the regular
    /// taxonomy.
    #[error("transport defect: {0}")]
    Defect(String),
}

/// One successful exchange: status, advertised length, and the body stream.
pub struct TransportResponse {
    /// The HTTP status code.
    pub status: u16,
    /// Content length advertised by the server, when known.
    pub content_length: Option<u64>,
    /// The response body as a stream of chunks.
    pub body: BodyStream,
}

impl TransportResponse {
    /// Creates a response from parts.
    #[must_use]
    pub fn new(status: u16, content_length: Option<u64>, body: BodyStream) -> Self {
        Self {
            status,
            content_length,
            body,
        }
    }

    /// Creates a response whose body is a single in-memory chunk.
    ///
    /// Mainly useful for tests and scripted transports.
    #[must_use]
    pub fn from_bytes(status: u16, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let content_length = Some(body.len() as u64);
        let stream: BoxStream<'static, Result<Bytes, TransportError>> =
            futures_util::stream::iter(vec![Ok(body)]).boxed();
        Self::new(status, content_length, stream)
    }

    /// Creates a bodiless response.
    #[must_use]
    pub fn empty(status: u16) -> Self {
        let stream: BoxStream<'static, Result<Bytes, TransportError>> =
            futures_util::stream::iter(Vec::new()).boxed();
        Self::new(status, Some(0), stream)
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Performs the actual network exchange for one request.
///
/// Implementations must be cheap to share across tasks (`Send + Sync`);
/// the executor holds one behind an `Arc`. Mid-flight cancellation is
/// expressed by the executor dropping the `execute` future, so
/// implementations must not rely on running to completion.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes one request and returns the response or a transport fault.
    async fn execute(
        &self,
        request: &RequestDescriptor,
    ) -> Result<TransportResponse, TransportError>;
}

/// Production [`Transport`] backed by a pooled `reqwest::Client`.
///
/// Created once and shared across requests to reuse connections. Timeouts
/// follow the crate defaults ([`CONNECT_TIMEOUT_SECS`],
/// [`READ_TIMEOUT_SECS`]); gzip decompression is enabled.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReqwestTransport {
    /// Creates a transport with the default timeout configuration.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a transport with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the supplied timeout
    /// configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .timeout(std::time::Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Wraps an existing `reqwest::Client`.
    #[must_use]
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(
        &self,
        request: &RequestDescriptor,
    ) -> Result<TransportResponse, TransportError> {
        let method = reqwest::Method::from_bytes(request.method().as_bytes())
            .map_err(|_| TransportError::Protocol(format!("invalid method {}", request.method())))?;

        let mut builder = self.client.request(method, request.url());
        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.request_body() {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(request.url(), &e))?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        debug!(status, content_length, url = %request.url(), "response headers received");

        let url = request.url().to_string();
        let body: BodyStream = response
            .bytes_stream()
            .map(move |chunk| {
                chunk.map_err(|e| TransportError::Io(format!("body stream error for {url}: {e}")))
            })
            .boxed();

        Ok(TransportResponse::new(status, content_length, body))
    }
}

/// Maps a `reqwest::Error` into the closed fault taxonomy.
fn map_reqwest_error(url: &str, error: &reqwest::Error) -> TransportError {
    let detail = format!("{url}: {}", error_chain_text(error));

    if error.is_timeout() {
        if error.is_connect() {
            return TransportError::ConnectTimeout(detail);
        }
        return TransportError::ReadTimeout(detail);
    }
    if error.is_builder() || error.is_redirect() {
        return TransportError::Protocol(detail);
    }
    if is_dns_failure(error) {
        return TransportError::Resolve(detail);
    }
    if error.is_connect() {
        return TransportError::Socket(detail);
    }
    TransportError::Io(detail)
}

/// Flattens an error and its source chain into one lowercase string.
fn error_chain_text(error: &(dyn std::error::Error + 'static)) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text.to_lowercase()
}

/// Checks if a reqwest error is a DNS resolution failure.
///
/// reqwest does not expose resolution failures as a dedicated kind; they
/// surface as connect errors whose chain names the lookup.
fn is_dns_failure(error: &reqwest::Error) -> bool {
    let text = error_chain_text(error);
    text.contains("dns")
        || text.contains("failed to lookup")
        || text.contains("name or service not known")
        || text.contains("nodename nor servname")
}
