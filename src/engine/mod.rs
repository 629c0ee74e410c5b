//! Countdown engine
//!
//! `machine` holds the synchronous state machine; `runner` drives it from a
//! one-second clock inside its own task.

pub mod machine;
pub mod runner;

pub use machine::{validate_duration, TimerMachine};
pub use runner::TimerEngine;
