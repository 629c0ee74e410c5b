//! Timer coordination across the UI and background lifetimes

pub mod timer_coordinator;

pub use timer_coordinator::{CoordinatorConfig, TimerCoordinator};
