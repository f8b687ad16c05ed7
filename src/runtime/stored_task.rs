//! Type-erased storage for spawned futures.
//!
//! The executor owns every spawned future as a `StoredTask`. The spawn path
//! wraps the user future so its output is delivered through the task's
//! result cell, leaving a uniform `Output = ()` future for the executor to
//! poll.

use crate::tracing_compat::trace;
use crate::types::TaskId;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A boxed future owned by the executor.
///
/// Dropping a `StoredTask` before completion runs the future's destructors,
/// which is how cancellation releases whatever the task was holding.
pub struct StoredTask {
    future: Pin<Box<dyn Future<Output = ()> + Send>>,
    task_id: TaskId,
    poll_count: u64,
}

impl StoredTask {
    /// Wraps a future for storage under `task_id`.
    pub fn new<F>(task_id: TaskId, future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
            task_id,
            poll_count: 0,
        }
    }

    /// Returns the owning task's id.
    #[must_use]
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Returns how many times this future has been polled.
    #[must_use]
    pub fn poll_count(&self) -> u64 {
        self.poll_count
    }

    /// Polls the stored future once.
    pub fn poll(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        self.poll_count += 1;
        trace!(task = %self.task_id, poll = self.poll_count, "polling task");
        let result = self.future.as_mut().poll(cx);
        if result.is_ready() {
            trace!(task = %self.task_id, polls = self.poll_count, "task future ready");
        }
        result
    }
}

impl std::fmt::Debug for StoredTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredTask")
            .field("task_id", &self.task_id)
            .field("poll_count", &self.poll_count)
            .finish_non_exhaustive()
    }
}
