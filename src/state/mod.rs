//! State management module
//!
//! Timer snapshots, coordinator status, and the daemon's shared state.

pub mod app_state;
pub mod coordinator_status;
pub mod timer_state;

// Re-export main types
pub use app_state::AppState;
pub use coordinator_status::{CoordinatorPhase, CoordinatorStatus};
pub use timer_state::{TimerEvent, TimerPhase, TimerState};
