//! Virtual time: sleeping, yielding, and reading the clock.
//!
//! The runtime's clock is virtual and only moves when no task is ready,
//! jumping straight to the earliest pending deadline. Sleeping tasks
//! register with the runtime's timer heap and are rescheduled when the
//! clock passes their deadline, so timing-dependent programs run
//! deterministically and without wall-clock waits.

mod sleep;

pub use sleep::{now, sleep, sleep_until, yield_now, Sleep, YieldNow};
