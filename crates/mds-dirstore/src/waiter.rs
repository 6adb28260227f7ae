//! Single-use continuations and the per-directory FIFO that holds them.

use std::collections::VecDeque;
use std::fmt;

use mds_types::Status;

/// A one-shot callback that resumes a caller with the result of an operation.
///
/// Consumed by [`Continuation::resume`], so it can run at most once. Dropping
/// an unresumed continuation releases it without running it.
pub struct Continuation(Box<dyn FnOnce(Status) + Send + 'static>);

impl Continuation {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Status) + Send + 'static,
    {
        Self(Box::new(f))
    }

    pub fn resume(self, status: Status) {
        (self.0)(status)
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Continuation")
    }
}

/// Resume `waiter` if the caller supplied one.
pub fn resume_if_some(waiter: Option<Continuation>, status: Status) {
    if let Some(waiter) = waiter {
        waiter.resume(status);
    }
}

/// FIFO of continuations waiting on a directory.
#[derive(Debug, Default)]
pub struct WaiterQueue {
    waiters: VecDeque<Continuation>,
}

impl WaiterQueue {
    pub fn push(&mut self, waiter: Continuation) {
        self.waiters.push_back(waiter);
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Move every queued waiter out, leaving this queue empty.
    pub fn take(&mut self) -> WaiterQueue {
        std::mem::take(self)
    }

    /// Resume every waiter in arrival order, each with its own copy of `status`.
    pub fn resume_all(self, status: &Status) {
        for waiter in self.waiters {
            waiter.resume(status.clone());
        }
    }
}
