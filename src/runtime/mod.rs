//! The runtime: executor loop, handles, configuration, and trace.
//!
//! [`Runtime`] drives every task to a terminal state on a single thread.
//! Each step pops one task from the two-lane scheduler and polls it; when
//! no task is ready but timers are pending, the virtual clock jumps to the
//! earliest deadline. A run ends in quiescence (every task terminal) or in
//! a deadlock report naming the stranded tasks and what they were last
//! waiting on.
//!
//! State transitions happen under the state lock and hand back [`Effects`]
//! to apply afterwards, so user callbacks and waker invocations never run
//! with a runtime lock held.

pub(crate) mod context;
mod config;
mod scheduler;
mod scope_handle;
mod state;
mod stored_task;
mod task_handle;
mod timer;
pub mod trace;
mod waker;

pub use config::RuntimeConfig;
pub use scheduler::Scheduler;
pub use scope_handle::{ScopeHandle, ScopeJoin, ScopeOptions};
pub use task_handle::{Join, JoinError, TaskHandle};
pub use trace::{TraceEvent, TraceEventKind};

use self::context::TaskContext;
use self::scheduler::Scheduler as Sched;
use self::state::{Effects, RuntimeState};
use self::stored_task::StoredTask;
use self::task_handle::ResultCell;
use self::waker::TaskWaker;
use crate::error::TaskError;
use crate::record::TerminalReport;
use crate::tracing_compat::{debug, info, warn};
use crate::types::{CancelReason, ScopeId, TaskId, TaskOutcome, Time};
use crate::util::DetRng;
use serde::Serialize;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};

/// A task still live when the runtime could make no further progress.
#[derive(Debug, Clone, Serialize)]
pub struct StrandedTask {
    /// The stranded task.
    pub task: TaskId,
    /// What it was waiting on when it last suspended.
    pub waiting_on: Option<&'static str>,
}

/// What a [`Runtime::run`] call accomplished.
///
/// An empty `stranded` list means quiescence: every spawned task reached a
/// terminal state. A non-empty list is a deadlock diagnosis, not a panic:
/// the named tasks can never run again because nothing is left to wake
/// them.
#[derive(Debug, Clone, Serialize)]
pub struct QuiescenceReport {
    /// Scheduling steps taken over the runtime's lifetime.
    pub steps: u64,
    /// The virtual clock at the end of the run.
    pub now: Time,
    /// Tasks that completed.
    pub completed: u64,
    /// Tasks that failed.
    pub failed: u64,
    /// Tasks that were cancelled.
    pub cancelled: u64,
    /// Failures that reached neither a joiner nor a failure handler.
    pub unhandled_failures: u64,
    /// Tasks left suspended with nothing to wake them.
    pub stranded: Vec<StrandedTask>,
}

impl QuiescenceReport {
    /// Returns true if every task reached a terminal state.
    #[must_use]
    pub fn is_quiescent(&self) -> bool {
        self.stranded.is_empty()
    }

    /// Returns true if some tasks can never run again.
    #[must_use]
    pub fn is_deadlocked(&self) -> bool {
        !self.stranded.is_empty()
    }
}

impl std::fmt::Display for QuiescenceReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "steps={} now={} completed={} failed={} cancelled={} unhandled={}",
            self.steps, self.now, self.completed, self.failed, self.cancelled,
            self.unhandled_failures
        )?;
        if self.is_deadlocked() {
            write!(f, " DEADLOCK:")?;
            for stranded in &self.stranded {
                write!(
                    f,
                    " {} ({})",
                    stranded.task,
                    stranded.waiting_on.unwrap_or("unknown wait")
                )?;
            }
        }
        Ok(())
    }
}

/// Applies deferred effects with no runtime lock held.
pub(crate) fn dispatch_effects(scheduler: &Arc<Mutex<Sched>>, effects: Effects) {
    let Effects {
        cancel,
        wake,
        failures,
    } = effects;
    if !cancel.is_empty() {
        let mut sched = scheduler.lock().expect("scheduler lock poisoned");
        for task in cancel {
            sched.schedule_cancel(task);
        }
    }
    for waker in wake {
        waker.wake();
    }
    for (handler, task, error) in failures {
        handler(task, &error);
    }
}

/// Registers a task under `scope`, wraps its future to deliver the result,
/// and enqueues it.
pub(crate) fn spawn_into_scope<T, F>(
    state: &Weak<Mutex<RuntimeState>>,
    scheduler: &Arc<Mutex<Sched>>,
    scope: ScopeId,
    future: F,
) -> TaskHandle<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T, TaskError>> + Send + 'static,
{
    let Some(strong) = state.upgrade() else {
        return TaskHandle::resolved(
            Err(JoinError::Cancelled(CancelReason::shutdown())),
            Arc::clone(scheduler),
        );
    };
    let entry = strong
        .lock()
        .expect("runtime state poisoned")
        .spawn_into(scope);
    let cell: ResultCell<T> = Arc::new(Mutex::new(None));
    let handle = TaskHandle::new(
        entry.task_id,
        Arc::clone(&cell),
        Weak::clone(state),
        Arc::clone(scheduler),
    );

    if entry.born_cancelled {
        let reason = entry
            .cancel
            .reason()
            .unwrap_or_else(CancelReason::parent_cancelled);
        let effects = strong
            .lock()
            .expect("runtime state poisoned")
            .finish_task(entry.task_id, TaskOutcome::Cancelled(reason), true);
        dispatch_effects(scheduler, effects);
        return handle;
    }

    let report = entry.report;
    let wrapped = {
        let cell = Arc::clone(&cell);
        async move {
            let result = future.await;
            let terminal = match &result {
                Ok(_) => TerminalReport::Completed,
                Err(error) => TerminalReport::Failed {
                    error: error.clone(),
                    // A second reference means a handle is still held and
                    // will receive the error on join.
                    observed: Arc::strong_count(&cell) > 1,
                },
            };
            *cell.lock().expect("task result cell poisoned") =
                Some(result.map_err(JoinError::Failed));
            *report.lock().expect("report slot poisoned") = Some(terminal);
        }
    };
    {
        let mut guard = strong.lock().expect("runtime state poisoned");
        guard.store_future(StoredTask::new(entry.task_id, wrapped));
        guard.trace_event(|seq, now| TraceEvent::schedule(seq, now, entry.task_id, scope));
    }
    scheduler
        .lock()
        .expect("scheduler lock poisoned")
        .schedule(entry.task_id);
    handle
}

/// A single-threaded cooperative runtime with virtual time.
///
/// ```
/// use taskloom::Runtime;
///
/// let mut rt = Runtime::new();
/// let handle = rt.spawn(async { 2 + 2 });
/// let report = rt.run();
/// assert!(report.is_quiescent());
/// assert_eq!(handle.try_join().unwrap().unwrap(), 4);
/// ```
#[derive(Debug)]
pub struct Runtime {
    state: Arc<Mutex<RuntimeState>>,
    scheduler: Arc<Mutex<Sched>>,
    rng: Option<DetRng>,
    config: RuntimeConfig,
}

impl Runtime {
    /// Creates a runtime with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Creates a runtime with an explicit configuration.
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(RuntimeState::new(config.trace_capacity()))),
            scheduler: Arc::new(Mutex::new(Sched::new())),
            rng: config.seed().map(DetRng::new),
            config,
        }
    }

    /// The configuration this runtime was built with.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// A handle to the root scope.
    #[must_use]
    pub fn root_scope(&self) -> ScopeHandle {
        let root = self.state.lock().expect("runtime state poisoned").root();
        ScopeHandle::new(root, Arc::downgrade(&self.state), Arc::clone(&self.scheduler))
    }

    /// Spawns a task under the root scope.
    pub fn spawn<T, F>(&self, future: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        self.root_scope().spawn_child(future)
    }

    /// Spawns a fallible task under the root scope.
    pub fn spawn_try<T, F>(&self, future: F) -> TaskHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, TaskError>> + Send + 'static,
    {
        self.root_scope().spawn_child_try(future)
    }

    /// Opens a scope under the root scope.
    #[must_use]
    pub fn new_scope(&self, options: ScopeOptions) -> ScopeHandle {
        self.root_scope().child_scope(options)
    }

    /// The current virtual time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.state.lock().expect("runtime state poisoned").now
    }

    /// Failures that reached neither a joiner nor a failure handler so far.
    #[must_use]
    pub fn unhandled_failures(&self) -> u64 {
        self.state
            .lock()
            .expect("runtime state poisoned")
            .unhandled_failures
    }

    /// The recent trace events, oldest first.
    #[must_use]
    pub fn trace_snapshot(&self) -> Vec<TraceEvent> {
        self.state
            .lock()
            .expect("runtime state poisoned")
            .trace
            .iter()
            .cloned()
            .collect()
    }

    /// Runs one scheduling step.
    ///
    /// Pops one task and polls it (or finalizes it, if cancellation was
    /// latched). Returns false when no task is ready; the clock does not
    /// move here.
    pub fn step(&mut self) -> bool {
        let popped = {
            let mut sched = self.scheduler.lock().expect("scheduler lock poisoned");
            match self.rng.as_mut() {
                Some(rng) => sched.pop_randomized(rng),
                None => sched.pop(),
            }
        };
        let Some(task) = popped else {
            return false;
        };

        // Latched cancellation wins over a pending wake: the future is
        // dropped unpolled so destructors run, and the task finishes
        // Cancelled.
        let cancel_reason = {
            let state = self.state.lock().expect("runtime state poisoned");
            match state.tasks.get(task.arena_index()) {
                Some(record) if !record.is_terminal() => record.cancel.reason(),
                _ => {
                    // Stale wake for a finished or unknown task.
                    return true;
                }
            }
        };
        if let Some(reason) = cancel_reason {
            let stored = self
                .state
                .lock()
                .expect("runtime state poisoned")
                .take_future(task);
            drop(stored);
            let effects = self.state.lock().expect("runtime state poisoned").finish_task(
                task,
                TaskOutcome::Cancelled(reason),
                true,
            );
            dispatch_effects(&self.scheduler, effects);
            return true;
        }

        let Some(mut stored) = self
            .state
            .lock()
            .expect("runtime state poisoned")
            .take_future(task)
        else {
            warn!(task = %task, "scheduled task has no stored future");
            return true;
        };
        let scope = {
            let mut state = self.state.lock().expect("runtime state poisoned");
            state.steps += 1;
            let step = state.steps;
            let Some(record) = state.tasks.get_mut(task.arena_index()) else {
                return true;
            };
            if !record.begin_poll(step) {
                state.store_future(stored);
                return true;
            }
            let scope = record.scope;
            state.trace_event(|seq, now| TraceEvent::poll(seq, now, task, scope));
            scope
        };

        let waker = TaskWaker::waker(task, Arc::clone(&self.scheduler));
        let mut cx = Context::from_waker(&waker);
        let guard = context::enter(TaskContext {
            task_id: task,
            scope_id: scope,
            state: Arc::downgrade(&self.state),
            scheduler: Arc::clone(&self.scheduler),
        });
        let poll_result = if self.config.panic_isolation() {
            catch_unwind(AssertUnwindSafe(|| stored.poll(&mut cx)))
                .map_err(|payload| TaskError::panicked(payload.as_ref()))
        } else {
            Ok(stored.poll(&mut cx))
        };
        drop(guard);
        let wait_note = context::take_wait_note();

        match poll_result {
            Ok(Poll::Pending) => {
                let mut state = self.state.lock().expect("runtime state poisoned");
                if let Some(record) = state.tasks.get_mut(task.arena_index()) {
                    record.suspend(wait_note);
                }
                state.store_future(stored);
            }
            Ok(Poll::Ready(())) => {
                let report = {
                    let state = self.state.lock().expect("runtime state poisoned");
                    state
                        .tasks
                        .get(task.arena_index())
                        .and_then(|record| record.report.lock().expect("report slot poisoned").take())
                };
                drop(stored);
                let (outcome, observed) = match report {
                    Some(TerminalReport::Completed) => (TaskOutcome::Completed, true),
                    Some(TerminalReport::Failed { error, observed }) => {
                        (TaskOutcome::Failed(error), observed)
                    }
                    None => (
                        TaskOutcome::Failed(TaskError::internal(
                            "task finished without reporting a result",
                        )),
                        false,
                    ),
                };
                let effects = self
                    .state
                    .lock()
                    .expect("runtime state poisoned")
                    .finish_task(task, outcome, observed);
                dispatch_effects(&self.scheduler, effects);
            }
            Err(panic_error) => {
                debug!(task = %task, error = %panic_error, "task panicked");
                drop(stored);
                let effects = self
                    .state
                    .lock()
                    .expect("runtime state poisoned")
                    .finish_task(task, TaskOutcome::Failed(panic_error), false);
                dispatch_effects(&self.scheduler, effects);
            }
        }
        true
    }

    /// Runs until quiescence or deadlock.
    ///
    /// Steps while tasks are ready; when none are but timers are pending,
    /// jumps the clock to the earliest deadline and continues. Returns a
    /// report either way; a deadlock is diagnosed, not panicked on.
    pub fn run(&mut self) -> QuiescenceReport {
        loop {
            while self.step() {}
            let (live, deadline) = {
                let state = self.state.lock().expect("runtime state poisoned");
                (state.live_task_count(), state.next_deadline())
            };
            if live == 0 {
                break;
            }
            let Some(deadline) = deadline else {
                break;
            };
            let expired = self
                .state
                .lock()
                .expect("runtime state poisoned")
                .advance_to(deadline);
            let mut sched = self.scheduler.lock().expect("scheduler lock poisoned");
            for task in expired {
                sched.schedule(task);
            }
        }
        let report = self.report();
        if report.is_deadlocked() {
            warn!(%report, "runtime stalled before quiescence");
        } else {
            info!(%report, "runtime quiescent");
        }
        report
    }

    /// Cancels everything under the root scope with a shutdown reason, then
    /// runs the teardown to quiescence.
    pub fn shutdown(&mut self) -> QuiescenceReport {
        let effects = {
            let mut state = self.state.lock().expect("runtime state poisoned");
            let root = state.root();
            state.cancel_scope_tree(root, &CancelReason::shutdown())
        };
        dispatch_effects(&self.scheduler, effects);
        self.run()
    }

    /// Builds a report from the current state without running anything.
    #[must_use]
    pub fn report(&self) -> QuiescenceReport {
        let state = self.state.lock().expect("runtime state poisoned");
        let (completed, failed, cancelled) = state.outcome_counts();
        QuiescenceReport {
            steps: state.steps,
            now: state.now,
            completed,
            failed,
            cancelled,
            unhandled_failures: state.unhandled_failures,
            stranded: state
                .stranded_tasks()
                .into_iter()
                .map(|(task, waiting_on)| StrandedTask { task, waiting_on })
                .collect(),
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::init_test_logging;
    use crate::time::{sleep, yield_now};
    use crate::types::{CancelKind, SupervisionPolicy};
    use std::time::Duration;

    #[test]
    fn empty_runtime_is_quiescent() {
        init_test_logging();
        let mut rt = Runtime::new();
        let report = rt.run();
        assert!(report.is_quiescent());
        assert_eq!(report.steps, 0);
        assert_eq!(report.now, Time::ZERO);
    }

    #[test]
    fn spawn_and_join_delivers_value() {
        init_test_logging();
        let mut rt = Runtime::new();
        let handle = rt.spawn(async { 40 + 2 });
        let report = rt.run();

        assert!(report.is_quiescent());
        assert_eq!(report.completed, 1);
        assert_eq!(handle.try_join().unwrap().unwrap(), 42);
    }

    #[test]
    fn join_inside_runtime_sees_result() {
        init_test_logging();
        let mut rt = Runtime::new();
        let scope = rt.root_scope();
        let outer = rt.spawn(async move {
            let inner = scope.spawn_child(async {
                yield_now().await;
                7
            });
            inner.join().await.unwrap()
        });
        rt.run();
        assert_eq!(outer.try_join().unwrap().unwrap(), 7);
    }

    #[test]
    fn failed_task_reports_through_join() {
        init_test_logging();
        let mut rt = Runtime::new();
        let handle = rt.spawn_try(async { Err::<(), _>(TaskError::failed("boom")) });
        let report = rt.run();

        assert_eq!(report.failed, 1);
        // The live handle makes the failure observed.
        assert_eq!(report.unhandled_failures, 0);
        let err = handle.try_join().unwrap().unwrap_err();
        assert!(err.is_failed());
    }

    #[test]
    fn dropped_handle_failure_is_counted_unhandled() {
        init_test_logging();
        let mut rt = Runtime::new();
        drop(rt.spawn_try(async { Err::<(), _>(TaskError::failed("nobody watching")) }));
        let report = rt.run();

        assert_eq!(report.failed, 1);
        assert_eq!(report.unhandled_failures, 1);
    }

    #[test]
    fn failure_handler_collects_unobserved_failure() {
        init_test_logging();
        let mut rt = Runtime::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let scope = rt.new_scope(
            ScopeOptions::new()
                .with_policy(SupervisionPolicy::CollectAll)
                .with_failure_handler(move |task, _err| {
                    sink.lock().unwrap().push(task);
                }),
        );
        drop(scope.spawn_child_try(async { Err::<(), _>(TaskError::failed("caught")) }));
        let report = rt.run();

        assert_eq!(report.unhandled_failures, 0);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn sleep_advances_virtual_clock() {
        init_test_logging();
        let mut rt = Runtime::new();
        rt.spawn(async {
            sleep(Duration::from_millis(250)).await;
        });
        let report = rt.run();

        assert!(report.is_quiescent());
        assert_eq!(report.now, Time::from_millis(250));
    }

    #[test]
    fn cancel_before_first_poll_skips_body() {
        init_test_logging();
        let mut rt = Runtime::new();
        let ran = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&ran);
        let handle = rt.spawn(async move {
            *flag.lock().unwrap() = true;
        });
        handle.cancel();
        let report = rt.run();

        assert_eq!(report.cancelled, 1);
        assert!(!*ran.lock().unwrap());
        let err = handle.try_join().unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn cancel_mid_sleep_finishes_cancelled() {
        init_test_logging();
        let mut rt = Runtime::new();
        let handle = rt.spawn(async {
            sleep(Duration::from_secs(60)).await;
        });
        // First poll parks the task on its timer.
        while rt.step() {}
        handle.cancel();
        let report = rt.run();

        assert_eq!(report.cancelled, 1);
        // The pending timer never fires; the clock stays put.
        assert_eq!(report.now, Time::ZERO);
    }

    #[test]
    fn panic_is_isolated_as_failure() {
        init_test_logging();
        let mut rt = Runtime::new();
        rt.spawn(async {
            panic!("task exploded");
        });
        let survivor = rt.spawn(async { "fine" });
        let report = rt.run();

        assert_eq!(report.failed, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(survivor.try_join().unwrap().unwrap(), "fine");
    }

    #[test]
    fn deadlocked_task_is_diagnosed_not_panicked() {
        init_test_logging();
        let mut rt = Runtime::new();
        rt.spawn(async {
            std::future::pending::<()>().await;
        });
        let report = rt.run();

        assert!(report.is_deadlocked());
        assert_eq!(report.stranded.len(), 1);
    }

    #[test]
    fn shutdown_cancels_everything() {
        init_test_logging();
        let mut rt = Runtime::new();
        let handle = rt.spawn(async {
            sleep(Duration::from_secs(3600)).await;
        });
        while rt.step() {}
        let report = rt.shutdown();

        assert!(report.is_quiescent());
        assert_eq!(report.cancelled, 1);
        match handle.try_join().unwrap().unwrap_err() {
            JoinError::Cancelled(reason) => assert_eq!(reason.kind(), CancelKind::Shutdown),
            other @ JoinError::Failed(_) => panic!("expected cancellation, got {other}"),
        }
    }

    #[test]
    fn seeded_runs_replay_identically() {
        init_test_logging();
        let completions_for_seed = |seed: u64| {
            let mut rt = Runtime::with_config(RuntimeConfig::new().with_seed(seed));
            let log = Arc::new(Mutex::new(Vec::new()));
            for n in 0..5 {
                let log = Arc::clone(&log);
                rt.spawn(async move {
                    yield_now().await;
                    log.lock().unwrap().push(n);
                });
            }
            rt.run();
            Arc::try_unwrap(log).unwrap().into_inner().unwrap()
        };

        assert_eq!(completions_for_seed(7), completions_for_seed(7));
        assert_eq!(completions_for_seed(7).len(), 5);
    }

    #[test]
    fn scope_join_aggregates_children() {
        init_test_logging();
        let mut rt = Runtime::new();
        let scope = rt.new_scope(ScopeOptions::new());
        let worker = scope.clone();
        let outcome = rt.spawn(async move {
            worker.spawn_child(async { yield_now().await });
            worker.spawn_child(async {});
            worker.join().await
        });
        rt.run();
        assert!(matches!(
            outcome.try_join().unwrap().unwrap(),
            crate::types::ScopeOutcome::Completed
        ));
    }

    #[test]
    fn spawn_after_runtime_drop_yields_cancelled_handle() {
        init_test_logging();
        let rt = Runtime::new();
        let scope = rt.root_scope();
        drop(rt);

        let handle = scope.spawn_child(async { 1 });
        assert!(!handle.is_active());
        let err = handle.try_join().unwrap().unwrap_err();
        assert!(err.is_cancelled());
    }
}
