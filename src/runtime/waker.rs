//! Task wakers that re-enqueue on the scheduler.
//!
//! Each poll gets a waker carrying the task's id and a handle to the
//! scheduler. Waking enqueues the id on the ready lane; the scheduler's
//! dedup guard collapses repeated wakes. Safe Rust only, via `std::task::Wake`.

use super::scheduler::Scheduler;
use crate::types::TaskId;
use std::sync::{Arc, Mutex};
use std::task::{Wake, Waker};

/// A waker that schedules its task when woken.
#[derive(Debug)]
pub(crate) struct TaskWaker {
    task_id: TaskId,
    scheduler: Arc<Mutex<Scheduler>>,
}

impl TaskWaker {
    /// Creates a waker for `task_id` that enqueues on `scheduler`.
    pub(crate) fn waker(task_id: TaskId, scheduler: Arc<Mutex<Scheduler>>) -> Waker {
        Waker::from(Arc::new(Self { task_id, scheduler }))
    }
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.scheduler
            .lock()
            .expect("scheduler lock poisoned")
            .schedule(self.task_id);
    }
}
