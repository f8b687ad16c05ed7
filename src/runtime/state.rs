//! Central runtime state: records, stored futures, clock, timers, trace.
//!
//! Everything the executor mutates lives here behind one mutex: the task
//! and scope arenas, the stored futures, the virtual clock and timer heap,
//! and the trace ring. Methods transition records and report what must
//! happen outside the lock as [`Effects`]: tasks to move to the cancel
//! lane, wakers to invoke, failure handlers to call. The state never
//! touches the scheduler or runs user callbacks itself, so no method here
//! can deadlock against them.

use super::stored_task::StoredTask;
use super::timer::TimerHeap;
use super::trace::{TraceBuffer, TraceEvent};
use crate::error::TaskError;
use crate::record::{FailureHandler, ReportSlot, ScopeRecord, TaskRecord};
use crate::tracing_compat::{debug, error, trace, warn};
use crate::types::{
    CancelLatch, CancelReason, ChildAction, ScopeId, ScopeOutcome, SupervisionPolicy, TaskId,
    TaskOutcome, Time,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::task::Waker;

/// Deferred actions produced by a state transition.
///
/// Collected under the state lock, dispatched by the caller after releasing
/// it: cancel-lane scheduling, waker invocation, and failure handlers all
/// re-enter runtime locks or user code.
#[derive(Default)]
pub(crate) struct Effects {
    /// Tasks to move to the scheduler's cancel lane.
    pub cancel: Vec<TaskId>,
    /// Wakers freed by scope closes.
    pub wake: Vec<Waker>,
    /// Failure handlers to invoke, with their arguments.
    pub failures: Vec<(FailureHandler, TaskId, TaskError)>,
}

impl Effects {
    /// Folds another effect set into this one.
    pub fn merge(&mut self, mut other: Self) {
        self.cancel.append(&mut other.cancel);
        self.wake.append(&mut other.wake);
        self.failures.append(&mut other.failures);
    }
}

/// Shared pieces handed to the spawn wrapper for a new task.
#[derive(Debug)]
pub(crate) struct SpawnEntry {
    /// The new task's id.
    pub task_id: TaskId,
    /// The task's cancellation latch.
    pub cancel: Arc<CancelLatch>,
    /// The slot the wrapper reports its terminal state through.
    pub report: ReportSlot,
    /// True if the owning scope was already closing: the task's future
    /// will be dropped unpolled and the task finishes `Cancelled`.
    pub born_cancelled: bool,
}

/// The mutable core of a runtime.
pub(crate) struct RuntimeState {
    /// All task records, live and terminal.
    pub tasks: crate::util::Arena<TaskRecord>,
    /// All scope records, live and closed.
    pub scopes: crate::util::Arena<ScopeRecord>,
    /// Stored futures of non-terminal tasks, removed while being polled.
    pub futures: HashMap<TaskId, StoredTask>,
    /// The virtual clock.
    pub now: Time,
    /// Pending sleep deadlines.
    pub timers: TimerHeap,
    /// Number of scheduling steps taken.
    pub steps: u64,
    /// Ring of recent trace events.
    pub trace: TraceBuffer,
    /// Failures that reached neither a handle nor a failure handler.
    pub unhandled_failures: u64,
    next_trace_seq: u64,
    root: ScopeId,
}

impl RuntimeState {
    /// Creates a fresh state with a root scope.
    pub fn new(trace_capacity: usize) -> Self {
        let mut scopes = crate::util::Arena::new();
        let root_index = scopes.insert_with(|ix| {
            ScopeRecord::new(ScopeId::from_arena(ix), None, SupervisionPolicy::default())
        });
        let root = ScopeId::from_arena(root_index);
        let mut state = Self {
            tasks: crate::util::Arena::new(),
            scopes,
            futures: HashMap::new(),
            now: Time::ZERO,
            timers: TimerHeap::new(),
            steps: 0,
            trace: TraceBuffer::new(trace_capacity),
            unhandled_failures: 0,
            next_trace_seq: 0,
            root,
        };
        state.trace_event(|seq, now| TraceEvent::scope_created(seq, now, root, None));
        state
    }

    /// Returns the root scope's id.
    #[must_use]
    pub fn root(&self) -> ScopeId {
        self.root
    }

    /// Appends a trace event built from the next sequence number and the
    /// current clock.
    pub fn trace_event(&mut self, make: impl FnOnce(u64, Time) -> TraceEvent) {
        let seq = self.next_trace_seq;
        self.next_trace_seq += 1;
        self.trace.push(make(seq, self.now));
    }

    /// Creates a scope under `parent`.
    ///
    /// A scope created under a closing or closed parent is born cancelled:
    /// it exists, rejects work, and closes as `Cancelled`.
    pub fn create_scope(
        &mut self,
        parent: ScopeId,
        policy: SupervisionPolicy,
        on_failure: Option<FailureHandler>,
    ) -> (ScopeId, Effects) {
        let mut effects = Effects::default();
        let index = self.scopes.insert_with(|ix| {
            let mut record = ScopeRecord::new(ScopeId::from_arena(ix), Some(parent), policy);
            record.on_failure = on_failure;
            record
        });
        let sid = ScopeId::from_arena(index);

        let born_cancelled = match self.scopes.get_mut(parent.arena_index()) {
            Some(p) if p.state.can_spawn() => {
                p.add_child(sid);
                false
            }
            Some(p) if !p.state.is_terminal() => {
                p.add_child(sid);
                true
            }
            _ => true,
        };

        self.trace_event(|seq, now| TraceEvent::scope_created(seq, now, sid, Some(parent)));
        debug!(scope = %sid, parent = %parent, policy = %policy, "scope created");

        if born_cancelled {
            effects.merge(self.cancel_scope_tree(sid, &CancelReason::parent_cancelled()));
        }
        (sid, effects)
    }

    /// Creates a task record owned by `scope`.
    ///
    /// The caller stores the wrapped future and schedules the task. A task
    /// spawned into a non-active scope is born cancelled.
    pub fn spawn_into(&mut self, scope: ScopeId) -> SpawnEntry {
        let cancel = Arc::new(CancelLatch::new());
        let report: ReportSlot = Arc::new(Mutex::new(None));
        let index = self.tasks.insert_with(|ix| {
            let mut record = TaskRecord::new(TaskId::from_arena(ix), scope);
            record.cancel = Arc::clone(&cancel);
            record.report = Arc::clone(&report);
            record
        });
        let task_id = TaskId::from_arena(index);

        let born_cancelled = match self.scopes.get_mut(scope.arena_index()) {
            Some(s) if s.state.can_spawn() => {
                s.add_task(task_id);
                false
            }
            Some(s) if !s.state.is_terminal() => {
                // Still owned: the scope waits for the cancelled drop.
                s.add_task(task_id);
                true
            }
            _ => true,
        };
        if born_cancelled {
            cancel.request(CancelReason::parent_cancelled());
        }

        self.trace_event(|seq, now| TraceEvent::spawn(seq, now, task_id, scope));
        debug!(task = %task_id, scope = %scope, born_cancelled, "task spawned");

        SpawnEntry {
            task_id,
            cancel,
            report,
            born_cancelled,
        }
    }

    /// Stores a task's future for later polling.
    pub fn store_future(&mut self, stored: StoredTask) {
        self.futures.insert(stored.task_id(), stored);
    }

    /// Takes a task's future out for polling or dropping.
    pub fn take_future(&mut self, task: TaskId) -> Option<StoredTask> {
        self.futures.remove(&task)
    }

    /// Latches a cancellation reason on one task.
    ///
    /// Returns true if the task is live and should move to the cancel lane.
    pub fn request_task_cancel(&mut self, task: TaskId, reason: CancelReason) -> bool {
        {
            let Some(record) = self.tasks.get(task.arena_index()) else {
                return false;
            };
            if record.is_terminal() {
                return false;
            }
            record.request_cancel(reason.clone());
        }
        self.trace_event(|seq, now| TraceEvent::cancel_request(seq, now, task, reason));
        true
    }

    /// Cancels a scope and everything under it.
    ///
    /// The same reason reaches every descendant; parents transition before
    /// their children, siblings in creation order. Scopes left without live
    /// work close immediately.
    pub fn cancel_scope_tree(&mut self, root: ScopeId, reason: &CancelReason) -> Effects {
        let mut effects = Effects::default();
        let mut queue = VecDeque::from([root]);
        let mut visited = Vec::new();

        while let Some(sid) = queue.pop_front() {
            let (tasks, children) = {
                let Some(scope) = self.scopes.get_mut(sid.arena_index()) else {
                    continue;
                };
                if scope.state.is_terminal() {
                    continue;
                }
                if scope.request_cancel(reason.clone()) {
                    debug!(scope = %sid, %reason, "scope cancelling");
                }
                (scope.tasks.clone(), scope.children.clone())
            };
            for tid in tasks {
                if self.request_task_cancel(tid, reason.clone()) {
                    effects.cancel.push(tid);
                }
            }
            queue.extend(children);
            visited.push(sid);
        }

        for sid in visited.into_iter().rev() {
            self.maybe_close(sid, &mut effects);
        }
        effects
    }

    /// Records a task's terminal outcome and runs the scope bookkeeping.
    ///
    /// `failure_observed` says whether a live handle received the error;
    /// unobserved failures go to the nearest ancestor failure handler, or
    /// are logged and counted.
    pub fn finish_task(
        &mut self,
        task: TaskId,
        outcome: TaskOutcome,
        failure_observed: bool,
    ) -> Effects {
        let mut effects = Effects::default();
        let sid = {
            let Some(record) = self.tasks.get_mut(task.arena_index()) else {
                warn!(task = %task, "finish for unknown task");
                return effects;
            };
            if !record.finish(outcome.clone()) {
                return effects;
            }
            effects.wake.extend(record.take_join_waiters());
            record.scope
        };
        self.trace_event(|seq, now| TraceEvent::complete(seq, now, task, sid));
        debug!(task = %task, scope = %sid, outcome = %outcome, "task finished");

        if let TaskOutcome::Failed(err) = &outcome {
            if !failure_observed {
                match self.find_failure_handler(sid) {
                    Some(handler) => effects.failures.push((handler, task, err.clone())),
                    None => {
                        error!(task = %task, error = %err, "unhandled task failure");
                        self.unhandled_failures += 1;
                    }
                }
            }
        }

        let action = match self.scopes.get_mut(sid.arena_index()) {
            Some(scope) if !scope.state.is_terminal() => {
                if scope.remove_task(task) {
                    scope.record_outcome(outcome.clone());
                    Some(scope.policy.on_child_outcome(&outcome))
                } else {
                    None
                }
            }
            _ => None,
        };
        if let Some(ChildAction::CancelSiblings(reason)) = action {
            effects.merge(self.cancel_scope_tree(sid, &reason));
        }

        self.maybe_close(sid, &mut effects);
        effects
    }

    /// Requests a scope join: drains the subtree and either returns the
    /// aggregated outcome or parks the waker until the scope closes.
    pub fn begin_join(
        &mut self,
        scope: ScopeId,
        waker: &Waker,
    ) -> (Option<ScopeOutcome>, Effects) {
        let mut effects = Effects::default();
        {
            let Some(record) = self.scopes.get(scope.arena_index()) else {
                warn!(scope = %scope, "join on unknown scope");
                return (Some(ScopeOutcome::Completed), effects);
            };
            if let Some(outcome) = &record.outcome {
                return (Some(outcome.clone()), effects);
            }
        }

        // Joining commits the subtree to winding down.
        let mut queue = VecDeque::from([scope]);
        let mut visited = Vec::new();
        while let Some(sid) = queue.pop_front() {
            let Some(record) = self.scopes.get_mut(sid.arena_index()) else {
                continue;
            };
            if record.state.is_terminal() {
                continue;
            }
            if record.begin_drain() {
                debug!(scope = %sid, "scope draining");
            }
            queue.extend(record.children.iter().copied());
            visited.push(sid);
        }
        for sid in visited.into_iter().rev() {
            self.maybe_close(sid, &mut effects);
        }

        let Some(record) = self.scopes.get_mut(scope.arena_index()) else {
            return (Some(ScopeOutcome::Completed), effects);
        };
        match &record.outcome {
            Some(outcome) => (Some(outcome.clone()), effects),
            None => {
                record.push_join_waiter(waker.clone());
                (None, effects)
            }
        }
    }

    /// Registers a sleep deadline for a task.
    pub fn register_timer(&mut self, task: TaskId, deadline: Time) {
        trace!(task = %task, deadline = %deadline, "timer registered");
        self.timers.insert(task, deadline);
    }

    /// Returns the earliest pending timer deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Time> {
        self.timers.peek_deadline()
    }

    /// Advances the clock to `target` (never backwards) and returns the
    /// live tasks whose deadlines expired.
    pub fn advance_to(&mut self, target: Time) -> Vec<TaskId> {
        if target > self.now {
            let old = self.now;
            self.now = target;
            trace!(old = %old, new = %target, "time advanced");
            self.trace_event(|seq, _| TraceEvent::time_advance(seq, old, target));
        }
        self.timers
            .pop_expired(self.now)
            .into_iter()
            .filter(|tid| {
                self.tasks
                    .get(tid.arena_index())
                    .is_some_and(|r| !r.is_terminal())
            })
            .collect()
    }

    /// Returns the number of non-terminal tasks.
    #[must_use]
    pub fn live_task_count(&self) -> usize {
        self.tasks.iter().filter(|(_, r)| !r.is_terminal()).count()
    }

    /// Returns the non-terminal tasks with what they were last waiting on.
    #[must_use]
    pub fn stranded_tasks(&self) -> Vec<(TaskId, Option<&'static str>)> {
        self.tasks
            .iter()
            .filter(|(_, r)| !r.is_terminal())
            .map(|(_, r)| (r.id, r.waiting_on))
            .collect()
    }

    /// Counts terminal outcomes: (completed, failed, cancelled).
    #[must_use]
    pub fn outcome_counts(&self) -> (u64, u64, u64) {
        let mut counts = (0, 0, 0);
        for (_, record) in self.tasks.iter() {
            match record.outcome() {
                Some(TaskOutcome::Completed) => counts.0 += 1,
                Some(TaskOutcome::Failed(_)) => counts.1 += 1,
                Some(TaskOutcome::Cancelled(_)) => counts.2 += 1,
                None => {}
            }
        }
        counts
    }

    fn find_failure_handler(&self, mut sid: ScopeId) -> Option<FailureHandler> {
        loop {
            let scope = self.scopes.get(sid.arena_index())?;
            if let Some(handler) = &scope.on_failure {
                return Some(Arc::clone(handler));
            }
            sid = scope.parent?;
        }
    }

    /// Closes `start` if it is drained, then walks up closing emptied
    /// ancestors, folding each closed scope's outcome into its parent.
    fn maybe_close(&mut self, start: ScopeId, effects: &mut Effects) {
        let mut sid = start;
        loop {
            let (outcome, parent, waiters) = {
                let Some(scope) = self.scopes.get_mut(sid.arena_index()) else {
                    return;
                };
                if !scope.state.is_closing() || scope.has_live_work() {
                    return;
                }
                let outcome = scope.aggregate();
                if !scope.close(outcome.clone()) {
                    return;
                }
                (outcome, scope.parent, scope.take_join_waiters())
            };
            effects.wake.extend(waiters);
            debug!(scope = %sid, outcome = %outcome, "scope closed");
            self.trace_event(|seq, now| TraceEvent::scope_closed(seq, now, sid, parent));

            let Some(pid) = parent else { return };
            let folded = fold_scope_outcome(&outcome);
            let action = match self.scopes.get_mut(pid.arena_index()) {
                Some(parent_rec) if !parent_rec.state.is_terminal() => {
                    if parent_rec.remove_child(sid) {
                        parent_rec.record_outcome(folded.clone());
                        parent_rec.policy.on_child_outcome(&folded)
                    } else {
                        ChildAction::Continue
                    }
                }
                _ => ChildAction::Continue,
            };
            if let ChildAction::CancelSiblings(reason) = action {
                let sub = self.cancel_scope_tree(pid, &reason);
                effects.merge(sub);
            }
            sid = pid;
        }
    }
}

impl std::fmt::Debug for RuntimeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeState")
            .field("tasks", &self.tasks.len())
            .field("scopes", &self.scopes.len())
            .field("stored_futures", &self.futures.len())
            .field("now", &self.now)
            .field("pending_timers", &self.timers.len())
            .field("steps", &self.steps)
            .field("unhandled_failures", &self.unhandled_failures)
            .finish_non_exhaustive()
    }
}

/// Folds a closed child scope's outcome into the parent's child-outcome
/// stream.
fn fold_scope_outcome(outcome: &ScopeOutcome) -> TaskOutcome {
    match outcome {
        ScopeOutcome::Completed => TaskOutcome::Completed,
        ScopeOutcome::Failed(error) => TaskOutcome::Failed(error.clone()),
        ScopeOutcome::Cancelled(reason) => TaskOutcome::Cancelled(reason.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::record::ScopeState;
    use crate::types::CancelKind;
    use std::task::Wake;

    struct NoopWaker;

    impl Wake for NoopWaker {
        fn wake(self: Arc<Self>) {}
    }

    fn noop_waker() -> Waker {
        Waker::from(Arc::new(NoopWaker))
    }

    fn failed_outcome() -> TaskOutcome {
        TaskOutcome::Failed(TaskError::new(ErrorKind::TaskFailed))
    }

    fn scope_state(state: &RuntimeState, sid: ScopeId) -> ScopeState {
        state
            .scopes
            .get(sid.arena_index())
            .map(|s| s.state)
            .expect("scope exists")
    }

    #[test]
    fn new_state_has_active_root() {
        let state = RuntimeState::new(64);
        assert_eq!(scope_state(&state, state.root()), ScopeState::Active);
        assert_eq!(state.live_task_count(), 0);
        assert_eq!(state.trace.len(), 1);
    }

    #[test]
    fn spawn_links_task_to_scope() {
        let mut state = RuntimeState::new(64);
        let root = state.root();
        let entry = state.spawn_into(root);

        assert!(!entry.born_cancelled);
        assert!(!entry.cancel.is_requested());
        assert_eq!(state.live_task_count(), 1);
        let owned = &state.scopes.get(root.arena_index()).expect("root").tasks;
        assert_eq!(owned, &vec![entry.task_id]);
    }

    #[test]
    fn spawn_into_cancelled_scope_is_born_cancelled() {
        let mut state = RuntimeState::new(64);
        let root = state.root();
        let (sid, _) = state.create_scope(root, SupervisionPolicy::FailFast, None);
        state.cancel_scope_tree(sid, &CancelReason::user("stop"));

        let entry = state.spawn_into(sid);
        assert!(entry.born_cancelled);
        assert_eq!(
            entry.cancel.reason().map(|r| r.kind()),
            Some(CancelKind::ParentCancelled)
        );
    }

    #[test]
    fn scope_under_cancelled_parent_closes_immediately() {
        let mut state = RuntimeState::new(64);
        let root = state.root();
        let (parent, _) = state.create_scope(root, SupervisionPolicy::FailFast, None);
        state.cancel_scope_tree(parent, &CancelReason::user("stop"));
        assert_eq!(scope_state(&state, parent), ScopeState::Closed);

        let (child, _) = state.create_scope(parent, SupervisionPolicy::FailFast, None);
        assert_eq!(scope_state(&state, child), ScopeState::Closed);
        let record = state.scopes.get(child.arena_index()).expect("child");
        assert!(matches!(record.outcome, Some(ScopeOutcome::Cancelled(_))));
    }

    #[test]
    fn finish_records_outcome_on_owner() {
        let mut state = RuntimeState::new(64);
        let root = state.root();
        let entry = state.spawn_into(root);

        let effects = state.finish_task(entry.task_id, TaskOutcome::Completed, true);
        assert!(effects.cancel.is_empty());

        let record = state.scopes.get(root.arena_index()).expect("root");
        assert!(record.tasks.is_empty());
        assert_eq!(record.outcomes.len(), 1);
        assert_eq!(state.outcome_counts(), (1, 0, 0));
    }

    #[test]
    fn fail_fast_failure_cancels_siblings() {
        let mut state = RuntimeState::new(64);
        let root = state.root();
        let (sid, _) = state.create_scope(root, SupervisionPolicy::FailFast, None);
        let failing = state.spawn_into(sid);
        let sibling = state.spawn_into(sid);

        let effects = state.finish_task(failing.task_id, failed_outcome(), true);
        assert_eq!(effects.cancel, vec![sibling.task_id]);
        assert_eq!(scope_state(&state, sid), ScopeState::Cancelling);
        assert_eq!(
            sibling.cancel.reason().map(|r| r.kind()),
            Some(CancelKind::SiblingFailed)
        );
    }

    #[test]
    fn collect_all_failure_leaves_siblings_running() {
        let mut state = RuntimeState::new(64);
        let root = state.root();
        let (sid, _) = state.create_scope(root, SupervisionPolicy::CollectAll, None);
        let failing = state.spawn_into(sid);
        let sibling = state.spawn_into(sid);

        let effects = state.finish_task(failing.task_id, failed_outcome(), true);
        assert!(effects.cancel.is_empty());
        assert_eq!(scope_state(&state, sid), ScopeState::Active);
        assert!(!sibling.cancel.is_requested());
    }

    #[test]
    fn cancel_scope_tree_reaches_nested_tasks() {
        let mut state = RuntimeState::new(64);
        let root = state.root();
        let (outer, _) = state.create_scope(root, SupervisionPolicy::FailFast, None);
        let (inner, _) = state.create_scope(outer, SupervisionPolicy::FailFast, None);
        let outer_task = state.spawn_into(outer);
        let inner_task = state.spawn_into(inner);

        let effects = state.cancel_scope_tree(outer, &CancelReason::timeout());
        assert_eq!(effects.cancel, vec![outer_task.task_id, inner_task.task_id]);
        assert_eq!(scope_state(&state, outer), ScopeState::Cancelling);
        assert_eq!(scope_state(&state, inner), ScopeState::Cancelling);
        assert_eq!(
            inner_task.cancel.reason().map(|r| r.kind()),
            Some(CancelKind::Timeout)
        );
    }

    #[test]
    fn join_on_empty_scope_completes_immediately() {
        let mut state = RuntimeState::new(64);
        let root = state.root();
        let (sid, _) = state.create_scope(root, SupervisionPolicy::FailFast, None);

        let waker = noop_waker();
        let (outcome, _) = state.begin_join(sid, &waker);
        assert!(matches!(outcome, Some(ScopeOutcome::Completed)));
        assert_eq!(scope_state(&state, sid), ScopeState::Closed);
    }

    #[test]
    fn join_parks_until_last_task_finishes() {
        let mut state = RuntimeState::new(64);
        let root = state.root();
        let (sid, _) = state.create_scope(root, SupervisionPolicy::FailFast, None);
        let entry = state.spawn_into(sid);

        let waker = noop_waker();
        let (outcome, _) = state.begin_join(sid, &waker);
        assert!(outcome.is_none());
        assert_eq!(scope_state(&state, sid), ScopeState::Draining);

        let effects = state.finish_task(entry.task_id, TaskOutcome::Completed, true);
        assert_eq!(effects.wake.len(), 1);
        assert_eq!(scope_state(&state, sid), ScopeState::Closed);

        let (outcome, _) = state.begin_join(sid, &waker);
        assert!(matches!(outcome, Some(ScopeOutcome::Completed)));
    }

    #[test]
    fn child_scope_failure_folds_into_parent() {
        let mut state = RuntimeState::new(64);
        let root = state.root();
        let (parent, _) = state.create_scope(root, SupervisionPolicy::FailFast, None);
        let (child, _) = state.create_scope(parent, SupervisionPolicy::CollectAll, None);
        let child_task = state.spawn_into(child);
        let parent_task = state.spawn_into(parent);

        // Drain the child so it closes when its task fails.
        let waker = noop_waker();
        let (pending, _) = state.begin_join(child, &waker);
        assert!(pending.is_none());

        let effects = state.finish_task(child_task.task_id, failed_outcome(), true);
        assert_eq!(scope_state(&state, child), ScopeState::Closed);
        // Parent is fail-fast: the folded failure cancels its other work.
        assert!(effects.cancel.contains(&parent_task.task_id));
        assert_eq!(scope_state(&state, parent), ScopeState::Cancelling);
    }

    #[test]
    fn unhandled_failure_is_counted() {
        let mut state = RuntimeState::new(64);
        let root = state.root();
        let entry = state.spawn_into(root);

        let effects = state.finish_task(entry.task_id, failed_outcome(), false);
        assert!(effects.failures.is_empty());
        assert_eq!(state.unhandled_failures, 1);
    }

    #[test]
    fn nearest_ancestor_handler_collects_failure() {
        let mut state = RuntimeState::new(64);
        let root = state.root();
        let seen: Arc<Mutex<Vec<TaskId>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler: FailureHandler = Arc::new(move |task, _err| {
            sink.lock().unwrap().push(task);
        });
        let (outer, _) = state.create_scope(root, SupervisionPolicy::CollectAll, Some(handler));
        let (inner, _) = state.create_scope(outer, SupervisionPolicy::CollectAll, None);
        let entry = state.spawn_into(inner);

        let effects = state.finish_task(entry.task_id, failed_outcome(), false);
        assert_eq!(effects.failures.len(), 1);
        assert_eq!(state.unhandled_failures, 0);

        // The caller invokes handlers outside the lock.
        for (handler, task, err) in &effects.failures {
            handler(*task, err);
        }
        assert_eq!(seen.lock().unwrap().as_slice(), &[entry.task_id]);
    }

    #[test]
    fn observed_failure_skips_handler() {
        let mut state = RuntimeState::new(64);
        let root = state.root();
        let handler: FailureHandler = Arc::new(|_, _| panic!("handler must not run"));
        let (sid, _) = state.create_scope(root, SupervisionPolicy::CollectAll, Some(handler));
        let entry = state.spawn_into(sid);

        let effects = state.finish_task(entry.task_id, failed_outcome(), true);
        assert!(effects.failures.is_empty());
        assert_eq!(state.unhandled_failures, 0);
    }

    #[test]
    fn advance_fires_due_timers_for_live_tasks() {
        let mut state = RuntimeState::new(64);
        let root = state.root();
        let live = state.spawn_into(root);
        let done = state.spawn_into(root);
        state.register_timer(live.task_id, Time::from_millis(100));
        state.register_timer(done.task_id, Time::from_millis(100));
        state.finish_task(done.task_id, TaskOutcome::Completed, true);

        assert_eq!(state.next_deadline(), Some(Time::from_millis(100)));
        let fired = state.advance_to(Time::from_millis(100));
        assert_eq!(fired, vec![live.task_id]);
        assert_eq!(state.now, Time::from_millis(100));

        // The clock never moves backwards.
        let fired = state.advance_to(Time::from_millis(50));
        assert!(fired.is_empty());
        assert_eq!(state.now, Time::from_millis(100));
    }

    #[test]
    fn cancelled_task_outcome_does_not_trigger_fail_fast() {
        let mut state = RuntimeState::new(64);
        let root = state.root();
        let (sid, _) = state.create_scope(root, SupervisionPolicy::FailFast, None);
        let cancelled = state.spawn_into(sid);
        let sibling = state.spawn_into(sid);

        let outcome = TaskOutcome::Cancelled(CancelReason::user("stop"));
        let effects = state.finish_task(cancelled.task_id, outcome, true);
        assert!(effects.cancel.is_empty());
        assert!(!sibling.cancel.is_requested());
    }
}
