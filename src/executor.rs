//! Per-request execution state machine with retry and cancellation.
//!
//! A [`RequestExecutor`] owns one request's lifecycle: it drives the
//! [`Transport`] through the attempt-with-retry loop, checks the cancellation
//! flag at loop boundaries, and emits lifecycle events into the configured
//! [`ResultSink`]. Exactly one terminal outcome is reported per execution:
//! success, immediate fatal failure, exhausted-retries failure, or
//! cancellation.
//!
//! # Cancellation
//!
//! `cancel()` may be called from any task or thread (typically through a
//! [`RequestHandle`]). It flips the cancellation flag, aborts the in-flight
//! transport call, and delivers the Cancel event. The flag is checked before
//! each attempt and again after the transport call returns, so a request
//! cancelled during transfer never delivers a stale success. A worker that
//! observes cancellation exits without emitting Finish.
//!
//! Known race: the cancelling caller and the worker run
//! concurrently, so Cancel can race with a terminal Failure/Finish from a
//! worker already past its last cancellation check. Each side delivers its
//! events exactly once; consumers that need a single winner must arbitrate
//! on their side.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use tokio::sync::Notify;
use tracing::{debug, info, instrument, warn};

use crate::error::RequestError;
use crate::handle::RequestHandle;
use crate::request::RequestDescriptor;
use crate::retry::{FaultClass, RetryDecision, RetryPolicy, classify_fault};
use crate::sink::{ResponseBody, ResultSink};
use crate::transport::{Transport, TransportError};

/// How the attempt loop ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// The response was delivered to the sink.
    Completed,
    /// Cancellation was observed; Cancel was already delivered by `cancel()`.
    Cancelled,
}

/// Owns one request's execution: retry loop, cancellation, event delivery.
///
/// Created per logical request, run exactly once by the task pool, and
/// discarded when the run completes. [`RequestExecutor::spawn`] is the usual
/// entry point: it runs the executor on a Tokio task and returns a
/// [`RequestHandle`] for cancellation and completion polling.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use reqtask::{
///     BackoffPolicy, ChannelSink, ReqwestTransport, RequestDescriptor, RequestExecutor,
/// };
///
/// # async fn example() {
/// let (sink, mut events) = ChannelSink::pair();
/// let handle = RequestExecutor::spawn(
///     RequestDescriptor::get("https://example.com/data.bin"),
///     Arc::new(ReqwestTransport::new()),
///     Arc::new(BackoffPolicy::default()),
///     Arc::new(sink),
/// );
/// while let Some(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// assert!(handle.is_finished());
/// # }
/// ```
pub struct RequestExecutor {
    /// The request being executed; immutable for the whole execution.
    request: RequestDescriptor,
    /// The transport performing the network exchange.
    transport: Arc<dyn Transport>,
    /// Retry decision function for retryable faults.
    policy: Arc<dyn RetryPolicy>,
    /// Receiver of lifecycle events.
    sink: Arc<dyn ResultSink>,
    /// Monotonic cancellation flag: false → true, never reset.
    cancelled: AtomicBool,
    /// Failures observed so far (incremented once per retried failure).
    attempts: AtomicU32,
    /// Abort signal racing the in-flight transport call.
    abort: Notify,
}

impl RequestExecutor {
    /// Creates an executor for one request.
    #[must_use]
    pub fn new(
        request: RequestDescriptor,
        transport: Arc<dyn Transport>,
        policy: Arc<dyn RetryPolicy>,
        sink: Arc<dyn ResultSink>,
    ) -> Self {
        Self {
            request,
            transport,
            policy,
            sink,
            cancelled: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            abort: Notify::new(),
        }
    }

    /// Runs the executor on a new Tokio task and returns its handle.
    ///
    /// The spawned task holds the only strong reference kept by the engine,
    /// so the handle's weak reference dies exactly when the run completes
    /// and the executor is discarded.
    #[must_use]
    pub fn spawn(
        request: RequestDescriptor,
        transport: Arc<dyn Transport>,
        policy: Arc<dyn RetryPolicy>,
        sink: Arc<dyn ResultSink>,
    ) -> RequestHandle {
        let executor = Arc::new(Self::new(request, transport, policy, sink));
        let weak = Arc::downgrade(&executor);
        let task = tokio::spawn(async move { executor.run().await });
        RequestHandle::new(weak, Some(task))
    }

    /// Requests cancellation of this execution.
    ///
    /// On the first call this sets the cancellation flag, aborts the
    /// in-flight transport call if one is active, and delivers the Cancel
    /// event. Idempotent: later calls observe the flag and do nothing.
    pub fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(url = %self.request.url(), "cancel requested");
        self.abort.notify_one();
        self.sink.on_cancel();
    }

    /// Returns the current value of the cancellation flag.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns the number of failed attempts observed so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// The worker entry point: runs the whole lifecycle once.
    ///
    /// Emits Start, drives the attempt-with-retry loop, and guarantees a
    /// terminal event: Finish after success, Failure then Finish after an
    /// unrecoverable fault, or nothing when cancellation already delivered
    /// Cancel.
    #[instrument(skip(self), fields(url = %self.request.url(), method = %self.request.method()))]
    pub async fn run(&self) {
        self.sink.on_start();

        match self.execute_with_retry().await {
            Ok(LoopExit::Completed) => {
                self.sink.on_finish();
            }
            Ok(LoopExit::Cancelled) => {
                debug!("run exiting after cancellation");
            }
            Err(error) => {
                let message = error
                    .classification()
                    .map_or_else(|| error.to_string(), str::to_owned);
                warn!(error = %error, "request failed");
                self.sink.on_failure(&error, ResponseBody::Empty, &message);
                self.sink.on_finish();
            }
        }
    }

    /// The attempt-with-retry loop.
    ///
    /// Cancellation is checked before each attempt and re-checked after the
    /// transport call returns, before the response reaches the sink.
    async fn execute_with_retry(&self) -> Result<LoopExit, RequestError> {
        loop {
            if self.is_cancelled() {
                return Ok(LoopExit::Cancelled);
            }

            self.request.validate_scheme()?;

            let Some(result) = self.execute_attempt().await else {
                // Aborted mid-flight; Cancel was delivered by cancel().
                return Ok(LoopExit::Cancelled);
            };

            match result {
                Ok(response) => {
                    if self.is_cancelled() {
                        return Ok(LoopExit::Cancelled);
                    }
                    debug!(status = response.status, "delivering response to sink");
                    self.sink.process_response(response).await;
                    return Ok(LoopExit::Completed);
                }
                Err(fault) => {
                    if self.is_cancelled() {
                        return Ok(LoopExit::Cancelled);
                    }
                    match classify_fault(&fault) {
                        FaultClass::Fatal { message } => {
                            debug!(error = %fault, message, "fatal transport fault");
                            return Err(RequestError::transport(message, fault));
                        }
                        FaultClass::Retryable => {
                            let cause = normalize_defect(fault);
                            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                            match self.policy.should_retry(&cause, attempt) {
                                RetryDecision::Retry {
                                    delay,
                                    attempt: next_attempt,
                                } => {
                                    info!(
                                        attempt = next_attempt,
                                        delay_ms = delay.as_millis() as u64,
                                        error = %cause,
                                        "retrying request"
                                    );
                                    tokio::time::sleep(delay).await;
                                }
                                RetryDecision::DoNotRetry { reason } => {
                                    debug!(%reason, "not retrying request");
                                    return Err(RequestError::retries_exhausted(attempt, cause));
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// Races one transport call against the abort signal.
    ///
    /// `None` means the call was aborted: the in-flight future is dropped,
    /// which tears down the underlying request.
    async fn execute_attempt(
        &self,
    ) -> Option<Result<crate::transport::TransportResponse, TransportError>> {
        tokio::select! {
            () = self.abort.notified() => None,
            result = self.transport.execute(&self.request) => Some(result),
        }
    }
}

/// Normalizes the transport-defect workaround fault into a generic I/O
/// fault before it reaches the retry policy.
fn normalize_defect(fault: TransportError) -> TransportError {
    match fault {
        TransportError::Defect(message) => {
            warn!(defect = %message, "normalizing transport defect to I/O fault");
            TransportError::Io(format!("transport defect: {message}"))
        }
        other => other,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sink::{ChannelSink, RequestEvent};
    use crate::transport::TransportResponse;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    /// Transport that always succeeds with a small body, counting calls.
    struct OkTransport {
        calls: AtomicU32,
    }

    impl OkTransport {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Transport for OkTransport {
        async fn execute(
            &self,
            _request: &RequestDescriptor,
        ) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(TransportResponse::from_bytes(200, &b"ok"[..]))
        }
    }

    /// Policy that retries immediately with no delay.
    struct ImmediatePolicy {
        max_retries: u32,
    }

    impl RetryPolicy for ImmediatePolicy {
        fn should_retry(&self, _cause: &TransportError, attempt: u32) -> RetryDecision {
            if attempt <= self.max_retries {
                RetryDecision::Retry {
                    delay: Duration::ZERO,
                    attempt: attempt + 1,
                }
            } else {
                RetryDecision::DoNotRetry {
                    reason: format!("max retries ({}) exhausted", self.max_retries),
                }
            }
        }
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<RequestEvent>) -> Vec<RequestEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent() {
        let (sink, mut rx) = ChannelSink::pair();
        let executor = RequestExecutor::new(
            RequestDescriptor::get("https://example.com"),
            Arc::new(OkTransport::new()),
            Arc::new(ImmediatePolicy { max_retries: 0 }),
            Arc::new(sink),
        );

        executor.cancel();
        executor.cancel();
        executor.cancel();

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1, "repeated cancel must emit one event");
        assert!(matches!(events[0], RequestEvent::Cancelled));
        assert!(executor.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_before_run_skips_network() {
        let (sink, mut rx) = ChannelSink::pair();
        let transport = Arc::new(OkTransport::new());
        let executor = RequestExecutor::new(
            RequestDescriptor::get("https://example.com"),
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(ImmediatePolicy { max_retries: 0 }),
            Arc::new(sink),
        );

        executor.cancel();
        executor.run().await;

        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        let events = drain(&mut rx);
        // Cancel (from cancel()) then Start (from run()); nothing else.
        assert!(matches!(events[0], RequestEvent::Cancelled));
        assert!(matches!(events[1], RequestEvent::Started));
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_url_fails_without_network() {
        let (sink, mut rx) = ChannelSink::pair();
        let transport = Arc::new(OkTransport::new());
        let executor = RequestExecutor::new(
            RequestDescriptor::get("example.com/no-scheme"),
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(ImmediatePolicy { max_retries: 3 }),
            Arc::new(sink),
        );

        executor.run().await;

        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
        let events = drain(&mut rx);
        assert!(matches!(events[0], RequestEvent::Started));
        assert!(
            matches!(&events[1], RequestEvent::Failed { message, .. } if message.contains("URI scheme"))
        );
        assert!(matches!(events[2], RequestEvent::Finished));
    }

    #[test]
    fn test_normalize_defect_rewraps_as_io() {
        let fault = normalize_defect(TransportError::Defect("poisoned".to_string()));
        assert!(matches!(&fault, TransportError::Io(msg) if msg.contains("poisoned")));

        let fault = normalize_defect(TransportError::ConnectTimeout("slow".to_string()));
        assert!(matches!(fault, TransportError::ConnectTimeout(_)));
    }

    #[tokio::test]
    async fn test_attempts_counter_tracks_failures() {
        struct AlwaysIo;

        #[async_trait]
        impl Transport for AlwaysIo {
            async fn execute(
                &self,
                _request: &RequestDescriptor,
            ) -> Result<TransportResponse, TransportError> {
                Err(TransportError::Io("reset".to_string()))
            }
        }

        let (sink, _rx) = ChannelSink::pair();
        let executor = RequestExecutor::new(
            RequestDescriptor::get("https://example.com"),
            Arc::new(AlwaysIo),
            Arc::new(ImmediatePolicy { max_retries: 2 }),
            Arc::new(sink),
        );

        executor.run().await;
        assert_eq!(executor.attempts(), 3);
    }
}
