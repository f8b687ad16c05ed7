//! Internal records for runtime entities.
//!
//! This module contains the internal record types used by the runtime
//! to track tasks and scopes.
//!
//! These are internal implementation details and not part of the public API.

pub mod scope;
pub mod task;

pub use scope::{FailureHandler, ScopeRecord, ScopeState};
pub use task::{ReportSlot, TaskRecord, TaskState, TerminalReport};
