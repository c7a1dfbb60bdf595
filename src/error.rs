//! Terminal error types for one request execution.
//!
//! Every execution reports exactly one terminal outcome through its sink;
//! [`RequestError`] is the failure half of that contract. Transport-level
//! faults ([`TransportError`](crate::transport::TransportError)) are either
//! wrapped here once they become terminal (fatal classification or exhausted
//! retries) or surfaced by a sink when streaming the body fails.

use std::path::PathBuf;

use thiserror::Error;

use crate::transport::TransportError;

/// Terminal failure for a single request execution.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request URL does not carry a valid URI scheme.
    ///
    /// Fatal and never retried: the request cannot be issued at all.
    #[error("no valid URI scheme in {url}")]
    MalformedUrl {
        /// The URL that failed to parse.
        url: String,
    },

    /// A transport fault classified as fatal (never retried).
    ///
    /// `message` is the fixed classification string handed to the sink,
    /// e.g. `"can't resolve host"` or `"socket time out"`.
    #[error("{message}")]
    Transport {
        /// Fixed human-readable classification for this fault kind.
        message: &'static str,
        /// The underlying transport fault.
        #[source]
        source: TransportError,
    },

    /// The retry policy declined further attempts.
    ///
    /// Wraps the last retryable cause as the final connection failure.
    #[error("connection failed after {attempts} attempts")]
    RetriesExhausted {
        /// Total attempts made, including the initial one.
        attempts: u32,
        /// The last retryable fault observed.
        #[source]
        source: TransportError,
    },

    /// A response completed with a non-success status (>= 300).
    #[error("HTTP status {status}")]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
    },

    /// File system error while streaming a response body to disk.
    #[error("IO error writing to {}: {source}", path.display())]
    Io {
        /// The destination path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The response body stream failed mid-transfer.
    #[error("transfer failed: {source}")]
    Stream {
        /// The transport fault raised by the body stream.
        #[source]
        source: TransportError,
    },
}

impl RequestError {
    /// Creates a malformed-URL error.
    pub fn malformed_url(url: impl Into<String>) -> Self {
        Self::MalformedUrl { url: url.into() }
    }

    /// Creates a fatal transport error with its fixed classification string.
    #[must_use]
    pub fn transport(message: &'static str, source: TransportError) -> Self {
        Self::Transport { message, source }
    }

    /// Creates an exhausted-retries error wrapping the last cause.
    #[must_use]
    pub fn retries_exhausted(attempts: u32, source: TransportError) -> Self {
        Self::RetriesExhausted { attempts, source }
    }

    /// Creates an HTTP status error.
    #[must_use]
    pub fn http_status(status: u16) -> Self {
        Self::HttpStatus { status }
    }

    /// Creates an IO error for a destination path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a body-transfer error.
    #[must_use]
    pub fn stream(source: TransportError) -> Self {
        Self::Stream { source }
    }

    /// Returns the fixed classification string for fatal transport faults.
    ///
    /// `None` for every other variant; callers fall back to the display
    /// form when building the sink's failure message.
    #[must_use]
    pub fn classification(&self) -> Option<&'static str> {
        match self {
            Self::Transport { message, .. } => Some(message),
            _ => None,
        }
    }
}

// No `From<TransportError>` / `From<std::io::Error>` impls: the variants
// require context (classification message, attempt count, path) that the
// source errors don't carry, so construction goes through the helpers.
