//! Revocable external reference to a running request.
//!
//! A [`RequestHandle`] lets the issuing side cancel a request or poll its
//! completion without keeping the executor alive: it holds only a weak
//! reference, which becomes unresolvable once the run completes and the
//! executor is discarded. From that point cancellation and status queries
//! degrade to safe no-ops and defaults.

use std::sync::Weak;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::executor::RequestExecutor;

/// Handle to a running (or finished) request execution.
///
/// Obtained from [`RequestExecutor::spawn`]. Safe to keep around
/// indefinitely: it never extends the executor's lifetime.
#[derive(Debug)]
pub struct RequestHandle {
    executor: Weak<RequestExecutor>,
    task: Option<JoinHandle<()>>,
}

impl RequestHandle {
    /// Creates a handle from the executor's weak reference and its task.
    pub(crate) fn new(executor: Weak<RequestExecutor>, task: Option<JoinHandle<()>>) -> Self {
        Self { executor, task }
    }

    /// Requests cancellation of the underlying execution.
    ///
    /// A no-op when the executor has already been discarded (the request
    /// finished).
    pub fn cancel(&self) {
        match self.executor.upgrade() {
            Some(executor) => executor.cancel(),
            None => debug!("cancel on finished request; ignoring"),
        }
    }

    /// Returns true if the underlying task has completed.
    ///
    /// Completion covers success, failure, and cancellation alike. A handle
    /// without a task reference is treated as already finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Returns the executor's cancellation flag.
    ///
    /// Returns `false` once the executor has been discarded: a finished
    /// execution cannot be distinguished from a cancelled-then-discarded
    /// one through this handle.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.executor
            .upgrade()
            .is_some_and(|executor| executor.is_cancelled())
    }
}
