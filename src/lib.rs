//! Cooking Timer - a background countdown timer daemon
//!
//! This library provides a single cooking timer that keeps counting while
//! its UI is gone: a durable background engine is the authority, a UI-scoped
//! engine mirrors it for display, and a finished timer rings until someone
//! acknowledges it.

pub mod api;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod services;
pub mod state;
pub mod tasks;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types
pub use api::create_router;
pub use config::Config;
pub use coordinator::{CoordinatorConfig, TimerCoordinator};
pub use engine::TimerEngine;
pub use error::TimerError;
pub use state::{AppState, TimerPhase, TimerState};
pub use utils::signals::shutdown_signal;
