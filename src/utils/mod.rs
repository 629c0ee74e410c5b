//! Utility functions module
//!
//! Signal handling and time formatting shared across the daemon.

pub mod format;
pub mod signals;

pub use format::{format_clock, format_uptime};
pub use signals::shutdown_signal;
