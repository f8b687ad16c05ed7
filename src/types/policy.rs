//! Supervision policy for scope outcome handling.
//!
//! A policy determines how a scope responds when a child reaches a terminal
//! state and how child outcomes are aggregated when the scope is joined.

use super::cancel::CancelReason;
use super::outcome::{ScopeOutcome, TaskOutcome};
use core::fmt;

/// Action a scope takes when one of its children reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildAction {
    /// Continue normally.
    Continue,
    /// Cancel the remaining children.
    CancelSiblings(CancelReason),
}

/// How a scope supervises its children.
///
/// Stored on the scope record at creation; consulted whenever a direct child
/// reaches a terminal state and when `join` aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SupervisionPolicy {
    /// The first child failure cancels the remaining siblings and becomes
    /// the scope's own failure. Cancelled children never trigger this.
    #[default]
    FailFast,
    /// Children run to their own terminal states regardless of sibling
    /// failures; `join` still reports the first failure.
    CollectAll,
}

impl SupervisionPolicy {
    /// Called when a direct child reaches a terminal state.
    #[must_use]
    pub fn on_child_outcome(self, outcome: &TaskOutcome) -> ChildAction {
        match (self, outcome) {
            (Self::FailFast, TaskOutcome::Failed(_)) => {
                ChildAction::CancelSiblings(CancelReason::sibling_failed())
            }
            _ => ChildAction::Continue,
        }
    }

    /// Aggregates child outcomes in child insertion order.
    ///
    /// The first failure wins; otherwise the strongest cancellation reason;
    /// otherwise completion. Both policies aggregate identically, they only
    /// differ in whether a failure cancels the siblings along the way.
    #[must_use]
    pub fn aggregate<'a, I>(self, outcomes: I) -> ScopeOutcome
    where
        I: IntoIterator<Item = &'a TaskOutcome>,
    {
        let mut first_failure = None;
        let mut strongest_cancel: Option<CancelReason> = None;
        for outcome in outcomes {
            match outcome {
                TaskOutcome::Completed => {}
                TaskOutcome::Failed(error) => {
                    if first_failure.is_none() {
                        first_failure = Some(error.clone());
                    }
                }
                TaskOutcome::Cancelled(reason) => match strongest_cancel.as_mut() {
                    Some(existing) => {
                        existing.strengthen(reason);
                    }
                    None => strongest_cancel = Some(reason.clone()),
                },
            }
        }
        first_failure.map_or_else(
            || strongest_cancel.map_or(ScopeOutcome::Completed, ScopeOutcome::Cancelled),
            ScopeOutcome::Failed,
        )
    }
}

impl fmt::Display for SupervisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FailFast => write!(f, "fail-fast"),
            Self::CollectAll => write!(f, "collect-all"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, TaskError};
    use crate::types::CancelKind;

    fn failed() -> TaskOutcome {
        TaskOutcome::Failed(TaskError::new(ErrorKind::TaskFailed))
    }

    #[test]
    fn fail_fast_cancels_siblings_on_failure() {
        let action = SupervisionPolicy::FailFast.on_child_outcome(&failed());
        assert_eq!(
            action,
            ChildAction::CancelSiblings(CancelReason::sibling_failed())
        );
    }

    #[test]
    fn cancelled_child_does_not_trigger_fail_fast() {
        let outcome = TaskOutcome::Cancelled(CancelReason::timeout());
        let action = SupervisionPolicy::FailFast.on_child_outcome(&outcome);
        assert_eq!(action, ChildAction::Continue);
    }

    #[test]
    fn collect_all_never_cancels_siblings() {
        let action = SupervisionPolicy::CollectAll.on_child_outcome(&failed());
        assert_eq!(action, ChildAction::Continue);
    }

    #[test]
    fn aggregate_prefers_first_failure() {
        let outcomes = vec![
            TaskOutcome::Completed,
            TaskOutcome::Cancelled(CancelReason::timeout()),
            failed(),
        ];
        let result = SupervisionPolicy::FailFast.aggregate(&outcomes);
        assert!(result.is_failed());
    }

    #[test]
    fn aggregate_strengthens_cancel_reasons() {
        let outcomes = vec![
            TaskOutcome::Cancelled(CancelReason::user("stop")),
            TaskOutcome::Cancelled(CancelReason::shutdown()),
            TaskOutcome::Completed,
        ];
        let result = SupervisionPolicy::CollectAll.aggregate(&outcomes);
        match result {
            ScopeOutcome::Cancelled(reason) => assert_eq!(reason.kind, CancelKind::Shutdown),
            other => unreachable!("expected cancelled outcome, got {other:?}"),
        }
    }

    #[test]
    fn aggregate_of_completions_is_completed() {
        let outcomes = vec![TaskOutcome::Completed, TaskOutcome::Completed];
        assert!(SupervisionPolicy::FailFast.aggregate(&outcomes).is_completed());
    }
}
