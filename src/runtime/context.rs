//! Thread-local context for the task currently being polled.
//!
//! The executor installs a [`TaskContext`] for the duration of each poll.
//! Leaf futures (sleep, channel operations) and ambient operations
//! (`time::now`, `with_timeout`) reach the runtime through it instead of
//! carrying a handle parameter everywhere.
//!
//! The context holds the runtime state weakly: a future polled after its
//! runtime dropped sees a dead link and stays pending instead of keeping
//! the state alive.

use super::scheduler::Scheduler;
use super::state::RuntimeState;
use crate::types::{ScopeId, TaskId};
use std::cell::{Cell, RefCell};
use std::sync::{Arc, Mutex, Weak};

thread_local! {
    static CURRENT: RefCell<Option<TaskContext>> = const { RefCell::new(None) };
    static WAIT_NOTE: Cell<Option<&'static str>> = const { Cell::new(None) };
}

/// Identity and runtime links of the task being polled.
#[derive(Debug, Clone)]
pub(crate) struct TaskContext {
    /// The task being polled.
    pub task_id: TaskId,
    /// The scope owning that task.
    pub scope_id: ScopeId,
    /// Weak link to the runtime state.
    pub state: Weak<Mutex<RuntimeState>>,
    /// The scheduler tasks re-enqueue themselves on.
    pub scheduler: Arc<Mutex<Scheduler>>,
}

/// Guard restoring the previous context on drop.
pub(crate) struct ContextGuard {
    prev: Option<TaskContext>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT.with(|slot| {
            *slot.borrow_mut() = prev;
        });
    }
}

/// Installs `cx` as the current context until the guard drops.
#[must_use]
pub(crate) fn enter(cx: TaskContext) -> ContextGuard {
    let prev = CURRENT.with(|slot| {
        let mut guard = slot.borrow_mut();
        let prev = guard.take();
        *guard = Some(cx);
        prev
    });
    ContextGuard { prev }
}

/// Returns the current task context, if a task is being polled.
#[must_use]
pub(crate) fn current() -> Option<TaskContext> {
    CURRENT.with(|slot| slot.borrow().clone())
}

/// Records what the current task is about to suspend on.
///
/// The executor collects the note after a pending poll and attaches it to
/// the task record, so a stranded task names its wait in diagnostics.
pub(crate) fn note_wait(what: &'static str) {
    WAIT_NOTE.with(|slot| slot.set(Some(what)));
}

/// Takes the wait note left by the last poll, if any.
pub(crate) fn take_wait_note() -> Option<&'static str> {
    WAIT_NOTE.with(Cell::take)
}
