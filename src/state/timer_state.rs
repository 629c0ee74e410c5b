//! Timer state snapshot

use serde::{Deserialize, Serialize};

/// Lifecycle phase of a single timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerPhase {
    Idle,
    Running,
    Paused,
    Finished,
}

impl std::fmt::Display for TimerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TimerPhase::Idle => "idle",
            TimerPhase::Running => "running",
            TimerPhase::Paused => "paused",
            TimerPhase::Finished => "finished",
        };
        f.write_str(name)
    }
}

/// Immutable snapshot of one timer's progress.
///
/// Only the engine produces new values; everyone else receives copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerState {
    pub total_duration_seconds: u64,
    pub remaining_seconds: u64,
    pub label: Option<String>,
    pub phase: TimerPhase,
}

impl TimerState {
    /// The reset state: nothing scheduled
    pub fn idle() -> Self {
        Self {
            total_duration_seconds: 0,
            remaining_seconds: 0,
            label: None,
            phase: TimerPhase::Idle,
        }
    }

    /// A freshly started countdown
    pub fn running(total_duration_seconds: u64, label: Option<String>) -> Self {
        Self {
            total_duration_seconds,
            remaining_seconds: total_duration_seconds,
            label,
            phase: TimerPhase::Running,
        }
    }

    /// Running or paused
    pub fn is_active(&self) -> bool {
        matches!(self.phase, TimerPhase::Running | TimerPhase::Paused)
    }

    pub fn is_finished(&self) -> bool {
        self.phase == TimerPhase::Finished
    }

    /// Check the snapshot invariants:
    /// `remaining <= total`, and `remaining == 0` iff Finished (Idle exempt).
    pub fn satisfies_invariants(&self) -> bool {
        if self.remaining_seconds > self.total_duration_seconds {
            return false;
        }
        match self.phase {
            TimerPhase::Idle => true,
            TimerPhase::Finished => self.remaining_seconds == 0,
            TimerPhase::Running | TimerPhase::Paused => self.remaining_seconds > 0,
        }
    }
}

impl Default for TimerState {
    fn default() -> Self {
        Self::idle()
    }
}

/// One element of an engine's outbound stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerEvent {
    /// Engine generation that produced this snapshot
    pub generation: u64,
    pub state: TimerState,
}
