//! Request descriptors for a single HTTP execution.
//!
//! A [`RequestDescriptor`] captures everything the transport needs to issue
//! one request: target URL, method, headers, and an optional body. It is
//! immutable once built and owned by the executor for the lifetime of the
//! execution.

use bytes::Bytes;
use url::Url;

use crate::error::RequestError;

/// An immutable description of one HTTP request.
///
/// Built once by the caller and handed to
/// [`RequestExecutor`](crate::executor::RequestExecutor), which owns it for
/// the duration of the execution. The URL is kept as the caller supplied it;
/// scheme validation happens inside the executor loop so a malformed URL is
/// reported through the sink like any other failure.
///
/// # Example
///
/// ```
/// use reqtask::RequestDescriptor;
///
/// let request = RequestDescriptor::get("https://example.com/data.bin")
///     .header("Accept", "application/octet-stream");
/// assert_eq!(request.method(), "GET");
/// ```
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    url: String,
    method: String,
    headers: Vec<(String, String)>,
    body: Option<Bytes>,
}

impl RequestDescriptor {
    /// Creates a descriptor with an explicit method.
    #[must_use]
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Creates a GET request descriptor.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    /// Creates a POST request descriptor with a body.
    #[must_use]
    pub fn post(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self::new("POST", url).body(body)
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Returns the target URL as supplied by the caller.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the headers in insertion order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns the request body, if any.
    #[must_use]
    pub fn request_body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Checks that the URL parses and carries a URI scheme.
    ///
    /// A URL without a scheme cannot be executed and is never retried.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::MalformedUrl`] when the URL does not parse.
    pub fn validate_scheme(&self) -> Result<(), RequestError> {
        Url::parse(&self.url)
            .map(|_| ())
            .map_err(|_| RequestError::malformed_url(&self.url))
    }
}
