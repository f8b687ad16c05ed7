//! Handles to spawned tasks.
//!
//! A [`TaskHandle`] is the owner-side view of one task: await its result,
//! request cancellation, or probe liveness. The typed result travels
//! through a one-shot cell shared with the spawn wrapper; everything else
//! goes through the task's record.

use super::context;
use super::scheduler::Scheduler;
use super::state::RuntimeState;
use crate::error::TaskError;
use crate::types::{CancelKind, CancelReason, TaskId, TaskOutcome};
use crate::util::ArenaIndex;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};
use thiserror::Error;

/// Why a joined task produced no value.
#[derive(Debug, Clone, Error)]
pub enum JoinError {
    /// The task body returned an error or panicked.
    #[error("task failed: {0}")]
    Failed(TaskError),
    /// The task was cancelled before completing.
    #[error("task cancelled: {0}")]
    Cancelled(CancelReason),
}

impl JoinError {
    /// Returns true for `Cancelled`.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns true for `Failed`.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Folds into a [`TaskError`] for callers that treat both the same.
    #[must_use]
    pub fn into_task_error(self) -> TaskError {
        match self {
            Self::Failed(error) => error,
            Self::Cancelled(reason) => TaskError::cancelled_with_reason(&reason),
        }
    }
}

/// One-shot cell the spawn wrapper delivers the typed result through.
pub(crate) type ResultCell<T> = Arc<Mutex<Option<Result<T, JoinError>>>>;

/// Id that can never address a live record; used by detached handles.
const fn detached_task_id() -> TaskId {
    TaskId::from_arena(ArenaIndex::new(u32::MAX, u32::MAX))
}

/// Owner-side handle to a spawned task.
///
/// Dropping the handle detaches the task: it keeps running under its scope,
/// and a later failure is routed to the scope's failure handler instead of
/// a joiner.
#[derive(Debug)]
pub struct TaskHandle<T> {
    task: TaskId,
    cell: ResultCell<T>,
    state: Weak<Mutex<RuntimeState>>,
    scheduler: Arc<Mutex<Scheduler>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        task: TaskId,
        cell: ResultCell<T>,
        state: Weak<Mutex<RuntimeState>>,
        scheduler: Arc<Mutex<Scheduler>>,
    ) -> Self {
        Self {
            task,
            cell,
            state,
            scheduler,
        }
    }

    /// Builds a handle whose result is already decided; used when spawning
    /// into a runtime that is gone or a scope that is already closing.
    pub(crate) fn resolved(
        result: Result<T, JoinError>,
        scheduler: Arc<Mutex<Scheduler>>,
    ) -> Self {
        Self {
            task: detached_task_id(),
            cell: Arc::new(Mutex::new(Some(result))),
            state: Weak::new(),
            scheduler,
        }
    }

    /// The task's id.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.task
    }

    /// Returns true while the task has not reached a terminal state.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.upgrade().is_some_and(|state| {
            state
                .lock()
                .expect("runtime state poisoned")
                .tasks
                .get(self.task.arena_index())
                .is_some_and(|record| !record.is_terminal())
        })
    }

    /// Requests cooperative cancellation with a user reason.
    ///
    /// The task observes it at its next suspension point; there is no
    /// immediate effect.
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::new(CancelKind::User));
    }

    /// Requests cooperative cancellation with an explicit reason.
    pub fn cancel_with(&self, reason: CancelReason) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let newly = state
            .lock()
            .expect("runtime state poisoned")
            .request_task_cancel(self.task, reason);
        if newly {
            self.scheduler
                .lock()
                .expect("scheduler lock poisoned")
                .schedule_cancel(self.task);
        }
    }

    /// Awaits the task's terminal result. A suspension point.
    ///
    /// The value is delivered once; a second join reports an internal
    /// failure rather than blocking forever.
    pub fn join(&self) -> Join<'_, T> {
        Join { handle: self }
    }

    /// Requests cancellation, then awaits the terminal result.
    pub async fn cancel_and_join(&self) -> Result<T, JoinError> {
        self.cancel();
        self.join().await
    }

    /// Takes the result without suspending, if the task is terminal.
    pub fn try_join(&self) -> Option<Result<T, JoinError>> {
        if let Some(result) = self
            .cell
            .lock()
            .expect("task result cell poisoned")
            .take()
        {
            return Some(result);
        }
        let Some(state) = self.state.upgrade() else {
            return Some(Err(JoinError::Cancelled(CancelReason::shutdown())));
        };
        let state = state.lock().expect("runtime state poisoned");
        match state
            .tasks
            .get(self.task.arena_index())
            .and_then(|record| record.outcome())
        {
            Some(TaskOutcome::Failed(error)) => Some(Err(JoinError::Failed(error.clone()))),
            Some(TaskOutcome::Cancelled(reason)) => {
                Some(Err(JoinError::Cancelled(reason.clone())))
            }
            Some(TaskOutcome::Completed) => Some(Err(JoinError::Failed(TaskError::internal(
                "task result already taken",
            )))),
            None => None,
        }
    }
}

/// Future returned by [`TaskHandle::join`]. A suspension point.
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct Join<'a, T> {
    handle: &'a TaskHandle<T>,
}

impl<T> Future for Join<'_, T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let handle = self.handle;
        if let Some(result) = handle
            .cell
            .lock()
            .expect("task result cell poisoned")
            .take()
        {
            return Poll::Ready(result);
        }
        let Some(state) = handle.state.upgrade() else {
            return Poll::Ready(Err(JoinError::Cancelled(CancelReason::shutdown())));
        };
        let mut state = state.lock().expect("runtime state poisoned");
        let Some(record) = state.tasks.get_mut(handle.task.arena_index()) else {
            return Poll::Ready(Err(JoinError::Failed(TaskError::internal(
                "join on unknown task",
            ))));
        };
        let outcome = record.outcome().cloned();
        match outcome {
            Some(TaskOutcome::Failed(error)) => Poll::Ready(Err(JoinError::Failed(error))),
            Some(TaskOutcome::Cancelled(reason)) => {
                Poll::Ready(Err(JoinError::Cancelled(reason)))
            }
            Some(TaskOutcome::Completed) => Poll::Ready(Err(JoinError::Failed(
                TaskError::internal("task result already taken"),
            ))),
            None => {
                record.push_join_waiter(cx.waker().clone());
                context::note_wait("task join");
                Poll::Pending
            }
        }
    }
}
