//! Terminal outcome types with a severity lattice.
//!
//! A task ends in exactly one of three terminal states:
//!
//! - `Completed`: the body produced its value (stored in the result slot)
//! - `Failed`: the body returned an error or panicked
//! - `Cancelled`: the cancellation latch was observed at a suspension point
//!
//! Severity orders them `Completed < Failed < Cancelled`. A cancellation
//! outranks a failure in the lattice because it erases work a failure would
//! still report; supervision policy, not severity, decides what a scope join
//! returns (the first failure still wins there, see
//! [`crate::types::SupervisionPolicy`]).
//!
//! The typed value itself lives in the task's result slot; these summaries
//! are what records keep for aggregation and introspection.

use super::cancel::CancelReason;
use crate::error::TaskError;
use core::fmt;

/// Severity of a terminal outcome, for lattice joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// The task completed with a value.
    Completed = 0,
    /// The task failed with an error or panic.
    Failed = 1,
    /// The task was cancelled before completing.
    Cancelled = 2,
}

/// The value-erased terminal state of a task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// The body produced its value.
    Completed,
    /// The body returned an error or panicked.
    Failed(TaskError),
    /// The cancellation latch was observed.
    Cancelled(CancelReason),
}

impl TaskOutcome {
    /// Returns the severity of this outcome.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::Completed => Severity::Completed,
            Self::Cancelled(_) => Severity::Cancelled,
            Self::Failed(_) => Severity::Failed,
        }
    }

    /// Returns true for `Completed`.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true for `Failed`.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns true for `Cancelled`.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns the error for `Failed` outcomes.
    #[must_use]
    pub const fn error(&self) -> Option<&TaskError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed(error) => write!(f, "failed: {error}"),
            Self::Cancelled(reason) => write!(f, "cancelled: {reason}"),
        }
    }
}

/// The aggregate terminal state of a scope, as reported by `join`.
#[derive(Debug, Clone)]
pub enum ScopeOutcome {
    /// Every child completed.
    Completed,
    /// At least one child failed; carries the first failure in child order.
    Failed(TaskError),
    /// No child failed but at least one was cancelled; carries the strongest
    /// reason.
    Cancelled(CancelReason),
}

impl ScopeOutcome {
    /// Returns true for `Completed`.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true for `Failed`.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Returns true for `Cancelled`.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Converts into a `Result`, mapping both failure and cancellation to the
    /// error side.
    pub fn into_result(self) -> Result<(), TaskError> {
        match self {
            Self::Completed => Ok(()),
            Self::Failed(error) => Err(error),
            Self::Cancelled(reason) => Err(TaskError::cancelled_with_reason(&reason)),
        }
    }
}

impl fmt::Display for ScopeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed(error) => write!(f, "failed: {error}"),
            Self::Cancelled(reason) => write!(f, "cancelled: {reason}"),
        }
    }
}
