//! Handles to cancellation scopes.
//!
//! A scope owns the tasks and child scopes created through it. The handle
//! is cheap to clone and can be moved into task bodies, so a task can
//! spawn siblings or open nested scopes under the same supervision tree.

use super::context;
use super::scheduler::Scheduler;
use super::state::RuntimeState;
use super::task_handle::TaskHandle;
use super::{dispatch_effects, spawn_into_scope};
use crate::error::TaskError;
use crate::record::FailureHandler;
use crate::types::{CancelKind, CancelReason, ScopeId, ScopeOutcome, SupervisionPolicy};
use crate::util::ArenaIndex;
use core::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

/// Supervision settings for a new scope.
#[derive(Default)]
pub struct ScopeOptions {
    policy: SupervisionPolicy,
    on_failure: Option<FailureHandler>,
}

impl ScopeOptions {
    /// Starts from the defaults: fail-fast, no failure handler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the supervision policy.
    #[must_use]
    pub fn with_policy(mut self, policy: SupervisionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Installs a handler for failures no joiner observes.
    ///
    /// The handler covers this scope's tasks and, transitively, any
    /// descendant scope without a handler of its own.
    #[must_use]
    pub fn with_failure_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(crate::types::TaskId, &TaskError) + Send + Sync + 'static,
    {
        self.on_failure = Some(Arc::new(handler));
        self
    }

    pub(crate) fn into_parts(self) -> (SupervisionPolicy, Option<FailureHandler>) {
        (self.policy, self.on_failure)
    }
}

impl fmt::Debug for ScopeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeOptions")
            .field("policy", &self.policy)
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

/// Id that can never address a live record; used by detached handles.
const fn detached_scope_id() -> ScopeId {
    ScopeId::from_arena(ArenaIndex::new(u32::MAX, u32::MAX))
}

/// Cloneable handle to a scope.
#[derive(Debug, Clone)]
pub struct ScopeHandle {
    scope: ScopeId,
    state: Weak<Mutex<RuntimeState>>,
    scheduler: Arc<Mutex<Scheduler>>,
}

impl ScopeHandle {
    pub(crate) fn new(
        scope: ScopeId,
        state: Weak<Mutex<RuntimeState>>,
        scheduler: Arc<Mutex<Scheduler>>,
    ) -> Self {
        Self {
            scope,
            state,
            scheduler,
        }
    }

    /// The scope's id.
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.scope
    }

    /// Spawns a child task whose body cannot fail.
    ///
    /// Spawned into a scope that is already winding down, the task is born
    /// cancelled: its body never runs and the handle joins as cancelled.
    pub fn spawn_child<T, F>(&self, future: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        spawn_into_scope(&self.state, &self.scheduler, self.scope, async move {
            Ok(future.await)
        })
    }

    /// Spawns a child task whose body reports failure through its result.
    ///
    /// An `Err` makes the task's outcome `Failed`, which under fail-fast
    /// supervision cancels its siblings.
    pub fn spawn_child_try<T, F>(&self, future: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        spawn_into_scope(&self.state, &self.scheduler, self.scope, future)
    }

    /// Opens a nested scope under this one.
    ///
    /// Cancelling this scope reaches the child and everything under it.
    #[must_use]
    pub fn child_scope(&self, options: ScopeOptions) -> Self {
        let Some(state) = self.state.upgrade() else {
            return Self::new(
                detached_scope_id(),
                Weak::new(),
                Arc::clone(&self.scheduler),
            );
        };
        let (policy, on_failure) = options.into_parts();
        let (sid, effects) = state
            .lock()
            .expect("runtime state poisoned")
            .create_scope(self.scope, policy, on_failure);
        dispatch_effects(&self.scheduler, effects);
        Self::new(sid, Weak::clone(&self.state), Arc::clone(&self.scheduler))
    }

    /// Cancels this scope and every task and scope beneath it.
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::new(CancelKind::User));
    }

    /// Cancels the subtree with an explicit reason.
    pub fn cancel_with(&self, reason: CancelReason) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let effects = state
            .lock()
            .expect("runtime state poisoned")
            .cancel_scope_tree(self.scope, &reason);
        dispatch_effects(&self.scheduler, effects);
    }

    /// Awaits the close of this scope and returns its aggregated outcome.
    ///
    /// Joining commits the subtree to winding down: no further spawns are
    /// accepted, and the join resolves once every task and child scope has
    /// reached a terminal state.
    pub fn join(&self) -> ScopeJoin<'_> {
        ScopeJoin { handle: self }
    }

    /// The aggregated outcome, if the scope has closed.
    #[must_use]
    pub fn outcome(&self) -> Option<ScopeOutcome> {
        let state = self.state.upgrade()?;
        let state = state.lock().expect("runtime state poisoned");
        state
            .scopes
            .get(self.scope.arena_index())
            .and_then(|record| record.outcome.clone())
    }

    /// Returns true while the scope accepts new work.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.upgrade().is_some_and(|state| {
            state
                .lock()
                .expect("runtime state poisoned")
                .scopes
                .get(self.scope.arena_index())
                .is_some_and(|record| record.state.can_spawn())
        })
    }
}

/// Future returned by [`ScopeHandle::join`]. A suspension point.
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct ScopeJoin<'a> {
    handle: &'a ScopeHandle,
}

impl Future for ScopeJoin<'_> {
    type Output = ScopeOutcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let handle = self.handle;
        let Some(state) = handle.state.upgrade() else {
            return Poll::Ready(ScopeOutcome::Cancelled(CancelReason::shutdown()));
        };
        let (outcome, effects) = state
            .lock()
            .expect("runtime state poisoned")
            .begin_join(handle.scope, cx.waker());
        dispatch_effects(&handle.scheduler, effects);
        match outcome {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                context::note_wait("scope join");
                Poll::Pending
            }
        }
    }
}
