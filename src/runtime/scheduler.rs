//! Two-lane cooperative scheduler.
//!
//! Ready tasks wait in one of two lanes:
//! 1. Cancel lane: tasks with a pending cancellation request
//! 2. Ready lane: everything else
//!
//! The cancel lane always drains first, so a cancelled task runs its
//! teardown promptly instead of queueing behind unrelated work. Within a
//! lane tasks run FIFO, except that seeded mode draws the next ready-lane
//! entry pseudo-randomly to shake out ordering assumptions.
//!
//! A task sits in at most one lane at a time; duplicate wakes collapse into
//! the existing entry.

use crate::types::TaskId;
use crate::util::DetRng;
use std::collections::{HashSet, VecDeque};

/// Queue of tasks ready to be polled.
#[derive(Debug, Default)]
pub struct Scheduler {
    cancel_lane: VecDeque<TaskId>,
    ready_lane: VecDeque<TaskId>,
    scheduled: HashSet<TaskId>,
}

impl Scheduler {
    /// Creates a new empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of scheduled tasks across both lanes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cancel_lane.len() + self.ready_lane.len()
    }

    /// Returns true if no task is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty()
    }

    /// Returns true if `task` is currently scheduled.
    #[must_use]
    pub fn contains(&self, task: TaskId) -> bool {
        self.scheduled.contains(&task)
    }

    /// Enqueues a task on the ready lane. Already-scheduled tasks stay in
    /// their current lane and position.
    pub fn schedule(&mut self, task: TaskId) {
        if self.scheduled.insert(task) {
            self.ready_lane.push_back(task);
        }
    }

    /// Enqueues a task on the cancel lane. If the task already waits in the
    /// ready lane it moves over, keeping one entry total.
    pub fn schedule_cancel(&mut self, task: TaskId) {
        if self.scheduled.insert(task) {
            self.cancel_lane.push_back(task);
        } else if !self.cancel_lane.contains(&task) {
            self.ready_lane.retain(|t| *t != task);
            self.cancel_lane.push_back(task);
        }
    }

    /// Pops the next task: cancel lane first, then ready lane FIFO.
    pub fn pop(&mut self) -> Option<TaskId> {
        let task = self
            .cancel_lane
            .pop_front()
            .or_else(|| self.ready_lane.pop_front())?;
        self.scheduled.remove(&task);
        Some(task)
    }

    /// Pops like [`pop`](Self::pop), but draws the ready-lane entry at a
    /// seeded pseudo-random position. The cancel lane stays FIFO so
    /// cancellation remains prompt under any seed.
    pub fn pop_randomized(&mut self, rng: &mut DetRng) -> Option<TaskId> {
        if let Some(task) = self.cancel_lane.pop_front() {
            self.scheduled.remove(&task);
            return Some(task);
        }
        if self.ready_lane.is_empty() {
            return None;
        }
        let pick = rng.next_usize(self.ready_lane.len());
        let task = self.ready_lane.remove(pick)?;
        self.scheduled.remove(&task);
        Some(task)
    }

    /// Removes a task from whichever lane holds it. Used when a task
    /// finishes so a stale wake cannot linger in the queue.
    pub fn remove(&mut self, task: TaskId) {
        if self.scheduled.remove(&task) {
            self.cancel_lane.retain(|t| *t != task);
            self.ready_lane.retain(|t| *t != task);
        }
    }
}
