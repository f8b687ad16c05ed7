//! Scope record for the runtime.
//!
//! A scope owns tasks and child scopes, forming a tree. Tasks and child
//! scopes are tracked in creation order so cancellation walks the tree
//! deterministically. When a scope closes it aggregates the outcomes of
//! everything it owned under its supervision policy.

use smallvec::SmallVec;
use std::fmt;
use std::sync::Arc;
use std::task::Waker;

use crate::error::TaskError;
use crate::types::{CancelReason, ScopeId, ScopeOutcome, SupervisionPolicy, TaskId, TaskOutcome};

/// Callback invoked when a task owned by the scope fails unobserved.
///
/// Installed at scope creation. Receives the failed task's id and error.
/// Shared behind `Arc` so the executor can invoke it after releasing its
/// locks; the handler is free to call back into the runtime.
pub type FailureHandler = Arc<dyn Fn(TaskId, &TaskError) + Send + Sync>;

/// The state of a scope in its lifecycle.
///
/// ```text
/// Active ──(join)──→ Draining ──(empty)──→ Closed
///   │                   │
///   └──────(cancel)─────┴→ Cancelling ──(empty)──→ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    /// Scope is open and accepting work.
    Active,
    /// Join requested; no new work, waiting for owned work to finish.
    Draining,
    /// Cancel issued to owned work, waiting for it to finish.
    Cancelling,
    /// Terminal state with aggregated outcome.
    Closed,
}

impl ScopeState {
    /// Returns true if the scope is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Returns true if the scope can accept new work.
    #[must_use]
    pub const fn can_spawn(self) -> bool {
        matches!(self, Self::Active)
    }

    /// Returns true if the scope is winding down (`Draining` or `Cancelling`).
    #[must_use]
    pub const fn is_closing(self) -> bool {
        matches!(self, Self::Draining | Self::Cancelling)
    }
}

/// Internal record for a scope in the runtime.
pub struct ScopeRecord {
    /// Unique identifier for this scope.
    pub id: ScopeId,
    /// Parent scope (None for the root).
    pub parent: Option<ScopeId>,
    /// Current state.
    pub state: ScopeState,
    /// How child failures are handled.
    pub policy: SupervisionPolicy,
    /// Live tasks owned by this scope, in spawn order.
    pub tasks: Vec<TaskId>,
    /// Live child scopes, in creation order.
    pub children: Vec<ScopeId>,
    /// Terminal outcomes of owned work, in completion order.
    pub outcomes: Vec<TaskOutcome>,
    /// Cancellation reason if the scope was cancelled.
    pub cancel_reason: Option<CancelReason>,
    /// Aggregated outcome, set when the scope closes.
    pub outcome: Option<ScopeOutcome>,
    /// Failure callback installed at creation.
    pub on_failure: Option<FailureHandler>,
    /// Wakers parked on this scope's join.
    join_waiters: SmallVec<[Waker; 4]>,
}

impl ScopeRecord {
    /// Creates a new scope record in the `Active` state.
    #[must_use]
    pub fn new(id: ScopeId, parent: Option<ScopeId>, policy: SupervisionPolicy) -> Self {
        Self {
            id,
            parent,
            state: ScopeState::Active,
            policy,
            tasks: Vec::new(),
            children: Vec::new(),
            outcomes: Vec::new(),
            cancel_reason: None,
            outcome: None,
            on_failure: None,
            join_waiters: SmallVec::new(),
        }
    }

    /// Returns true if the scope still owns live tasks or child scopes.
    #[must_use]
    pub fn has_live_work(&self) -> bool {
        !self.tasks.is_empty() || !self.children.is_empty()
    }

    /// Adds a task to this scope.
    pub fn add_task(&mut self, task: TaskId) {
        if !self.tasks.contains(&task) {
            self.tasks.push(task);
        }
    }

    /// Removes a task from this scope. Returns true if the scope owned it.
    pub fn remove_task(&mut self, task: TaskId) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|&t| t != task);
        self.tasks.len() != before
    }

    /// Adds a child scope.
    pub fn add_child(&mut self, child: ScopeId) {
        if !self.children.contains(&child) {
            self.children.push(child);
        }
    }

    /// Removes a child scope. Returns true if the scope owned it.
    pub fn remove_child(&mut self, child: ScopeId) -> bool {
        let before = self.children.len();
        self.children.retain(|&c| c != child);
        self.children.len() != before
    }

    /// Records the terminal outcome of an owned task or child scope.
    pub fn record_outcome(&mut self, outcome: TaskOutcome) {
        self.outcomes.push(outcome);
    }

    /// Requests cancellation of this scope.
    ///
    /// Returns true if the scope newly entered `Cancelling`. Repeated
    /// requests strengthen the stored reason.
    pub fn request_cancel(&mut self, reason: CancelReason) -> bool {
        match self.state {
            ScopeState::Active | ScopeState::Draining => {
                self.state = ScopeState::Cancelling;
                self.cancel_reason = Some(reason);
                true
            }
            ScopeState::Cancelling => {
                match &mut self.cancel_reason {
                    Some(existing) => {
                        existing.strengthen(&reason);
                    }
                    None => self.cancel_reason = Some(reason),
                }
                false
            }
            ScopeState::Closed => false,
        }
    }

    /// Begins draining: join was requested, no new work is expected.
    ///
    /// Returns true if the state changed.
    pub fn begin_drain(&mut self) -> bool {
        if self.state == ScopeState::Active {
            self.state = ScopeState::Draining;
            true
        } else {
            false
        }
    }

    /// Closes the scope with the given aggregated outcome.
    ///
    /// Returns true if the state changed. Only draining or cancelling
    /// scopes can close.
    pub fn close(&mut self, outcome: ScopeOutcome) -> bool {
        if self.state.is_closing() {
            self.state = ScopeState::Closed;
            self.outcome = Some(outcome);
            true
        } else {
            false
        }
    }

    /// Aggregates recorded outcomes under this scope's policy.
    ///
    /// A cancelled scope reports at least `Cancelled` even when every
    /// owned task finished cleanly before observing the cancel.
    #[must_use]
    pub fn aggregate(&self) -> ScopeOutcome {
        let aggregated = self.policy.aggregate(&self.outcomes);
        if aggregated.is_completed() {
            if let Some(reason) = &self.cancel_reason {
                return ScopeOutcome::Cancelled(reason.clone());
            }
        }
        aggregated
    }

    /// Parks a waker on this scope's join.
    pub fn push_join_waiter(&mut self, waker: Waker) {
        self.join_waiters.push(waker);
    }

    /// Takes all parked join wakers for waking.
    pub fn take_join_waiters(&mut self) -> SmallVec<[Waker; 4]> {
        std::mem::take(&mut self.join_waiters)
    }
}

impl fmt::Debug for ScopeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRecord")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("state", &self.state)
            .field("policy", &self.policy)
            .field("tasks", &self.tasks)
            .field("children", &self.children)
            .field("outcomes", &self.outcomes)
            .field("cancel_reason", &self.cancel_reason)
            .field("outcome", &self.outcome)
            .field("on_failure", &self.on_failure.is_some())
            .field("join_waiters", &self.join_waiters.len())
            .finish()
    }
}
