//! Task record for the runtime.
//!
//! A task is a unit of concurrent execution owned by a scope. This module
//! defines the internal record structure for tracking task state across
//! poll cycles.
//!
//! Cancellation is latched, not stored in the state machine: the record
//! shares a [`CancelLatch`] with task handles, and the executor checks the
//! latch before each poll. A latched task never reaches its future again;
//! the stored future is dropped so destructors run, and the record moves
//! straight to `Finished(Cancelled)`.

use smallvec::SmallVec;
use std::sync::{Arc, Mutex};
use std::task::Waker;

use crate::error::TaskError;
use crate::types::{CancelLatch, CancelReason, ScopeId, TaskId, TaskOutcome};

/// The state of a task in its lifecycle.
///
/// ```text
/// Created → Running ⇄ Suspended
///              │
///              └→ Finished(outcome)
/// ```
#[derive(Debug)]
pub enum TaskState {
    /// Initial state after spawn, before the first poll.
    Created,
    /// Actively being polled.
    Running,
    /// Parked at a suspension point, waiting for a wake.
    Suspended,
    /// Terminal state.
    Finished(TaskOutcome),
}

impl TaskState {
    /// Returns true if the task is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_))
    }

    /// Returns true if the task can be handed to the executor.
    #[must_use]
    pub const fn can_be_polled(&self) -> bool {
        matches!(self, Self::Created | Self::Suspended)
    }
}

/// What a task body reported when its wrapped future returned `Ready`.
///
/// Written by the spawn wrapper, consumed by the executor to pick the
/// terminal [`TaskOutcome`]. Cancellation never appears here: a cancelled
/// task's future is dropped before it can report anything.
#[derive(Debug)]
pub enum TerminalReport {
    /// The body ran to completion.
    Completed,
    /// The body returned an error or panicked.
    Failed {
        /// The error the body produced.
        error: TaskError,
        /// True if a live handle received the error when it was delivered.
        /// Unobserved failures go to the scope failure handler instead.
        observed: bool,
    },
}

/// Shared slot the spawn wrapper writes its [`TerminalReport`] into.
pub type ReportSlot = Arc<Mutex<Option<TerminalReport>>>;

/// Internal record for a task in the runtime.
#[derive(Debug)]
pub struct TaskRecord {
    /// Unique identifier for this task.
    pub id: TaskId,
    /// The scope that owns this task.
    pub scope: ScopeId,
    /// Current state of the task.
    pub state: TaskState,
    /// One-way cancellation latch, shared with task handles.
    pub cancel: Arc<CancelLatch>,
    /// Terminal report written by the spawn wrapper.
    pub report: ReportSlot,
    /// Number of times this task has been polled.
    pub polls: u64,
    /// Last executor step this task was polled on.
    pub last_polled_step: u64,
    /// What the task was waiting on when it last suspended.
    pub waiting_on: Option<&'static str>,
    /// Tasks parked on this task's join, woken when it finishes.
    join_waiters: SmallVec<[Waker; 2]>,
}

impl TaskRecord {
    /// Creates a new task record in the `Created` state.
    #[must_use]
    pub fn new(id: TaskId, scope: ScopeId) -> Self {
        Self {
            id,
            scope,
            state: TaskState::Created,
            cancel: Arc::new(CancelLatch::new()),
            report: Arc::new(Mutex::new(None)),
            polls: 0,
            last_polled_step: 0,
            waiting_on: None,
            join_waiters: SmallVec::new(),
        }
    }

    /// Returns true if the task is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns the terminal outcome, if the task has finished.
    #[must_use]
    pub const fn outcome(&self) -> Option<&TaskOutcome> {
        match &self.state {
            TaskState::Finished(outcome) => Some(outcome),
            _ => None,
        }
    }

    /// Marks the task as running and records poll bookkeeping.
    ///
    /// Returns true if the task was pollable (`Created` or `Suspended`).
    pub fn begin_poll(&mut self, step: u64) -> bool {
        if !self.state.can_be_polled() {
            return false;
        }
        self.state = TaskState::Running;
        self.polls += 1;
        self.last_polled_step = step;
        self.waiting_on = None;
        true
    }

    /// Parks the task after a poll returned `Pending`.
    ///
    /// Returns true if the task was `Running`.
    pub fn suspend(&mut self, waiting_on: Option<&'static str>) -> bool {
        if matches!(self.state, TaskState::Running) {
            self.state = TaskState::Suspended;
            self.waiting_on = waiting_on;
            true
        } else {
            false
        }
    }

    /// Finishes the task with the given outcome.
    ///
    /// Returns true if the state changed; terminal states are absorbing.
    pub fn finish(&mut self, outcome: TaskOutcome) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = TaskState::Finished(outcome);
        self.waiting_on = None;
        true
    }

    /// Requests cancellation of this task.
    ///
    /// Returns true if the latch was newly set. Requests against terminal
    /// tasks are ignored.
    pub fn request_cancel(&self, reason: CancelReason) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.cancel.request(reason)
    }

    /// Returns true if cancellation has been requested.
    #[must_use]
    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_requested()
    }

    /// Parks a waker to be woken when this task finishes.
    pub fn push_join_waiter(&mut self, waker: Waker) {
        self.join_waiters.push(waker);
    }

    /// Takes the parked join waiters for waking.
    pub fn take_join_waiters(&mut self) -> SmallVec<[Waker; 2]> {
        std::mem::take(&mut self.join_waiters)
    }
}
