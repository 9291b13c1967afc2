//! Deadlines for embedding and vector-store calls.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::RecvTimeoutError;

use crate::error::{ClaimtrailError, Result};

/// One time budget shared by every call made for a single request.
///
/// The clock starts when the deadline is created; each [`Deadline::run`] gets only
/// what is left, so an embedding call and a store call together never exceed the
/// budget.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    limit: Option<(Instant, Duration)>,
}

impl Deadline {
    /// A deadline `timeout` from now; `None` never expires.
    pub(crate) fn after(timeout: Option<Duration>) -> Self {
        Self {
            limit: timeout.map(|budget| (Instant::now() + budget, budget)),
        }
    }

    /// Run `task` within whatever remains of the budget.
    ///
    /// Without a budget the task runs inline. With one, it runs on a worker thread; on
    /// expiry the caller gets `StoreTimeout` and the worker's eventual result is dropped.
    pub(crate) fn run<T, F>(&self, operation: &'static str, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        let Some((expires_at, budget)) = self.limit else {
            return task();
        };
        let remaining = expires_at.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(timed_out(operation, budget));
        }

        let (sender, receiver) = crossbeam_channel::bounded(1);
        thread::Builder::new()
            .name(format!("claimtrail-{operation}"))
            .spawn(move || {
                // The receiver is gone once the caller has timed out.
                let _ = sender.send(task());
            })
            .map_err(|err| {
                ClaimtrailError::unavailable(format!("cannot spawn {operation} worker: {err}"))
            })?;

        match receiver.recv_timeout(remaining) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(timed_out(operation, budget)),
            Err(RecvTimeoutError::Disconnected) => Err(ClaimtrailError::unavailable(format!(
                "{operation} worker exited without a result"
            ))),
        }
    }
}

fn timed_out(operation: &'static str, budget: Duration) -> ClaimtrailError {
    let timeout_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX);
    tracing::warn!(operation, timeout_ms, "store call timed out");
    ClaimtrailError::StoreTimeout {
        operation,
        timeout_ms,
    }
}
