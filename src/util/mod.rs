//! Internal utilities for the runtime.
//!
//! Intentionally minimal and dependency-free so scheduling stays
//! deterministic.

pub mod arena;
pub mod det_rng;

pub use arena::{Arena, ArenaIndex};
pub use det_rng::DetRng;
