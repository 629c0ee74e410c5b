//! Coordinator-level status shared with observers

use serde::{Deserialize, Serialize};

use super::TimerState;

/// Coordinator lifecycle, superimposed on the engine phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorPhase {
    NoTimer,
    /// Durable start requested, not yet confirmed
    Starting,
    Active,
    Alarming,
}

/// Snapshot of the coordinator for UI surfaces and the HTTP API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub phase: CoordinatorPhase,
    /// Running local-only: the timer will not survive backgrounding
    pub degraded: bool,
    pub grant_held: bool,
    pub ui_attached: bool,
    /// Authoritative timer snapshot (durable, or local when degraded)
    pub timer: TimerState,
    /// One-time warnings waiting to be dismissed
    pub warnings: Vec<String>,
    pub alarms_entered: u64,
}

impl CoordinatorStatus {
    pub fn new() -> Self {
        Self {
            phase: CoordinatorPhase::NoTimer,
            degraded: false,
            grant_held: false,
            ui_attached: true,
            timer: TimerState::idle(),
            warnings: Vec::new(),
            alarms_entered: 0,
        }
    }

    /// Add a warning unless an identical one is already pending
    pub fn add_warning(&mut self, warning: String) {
        if !self.warnings.contains(&warning) {
            tracing::warn!("Adding warning to status: {}", warning);
            self.warnings.push(warning);
        }
    }

    pub fn clear_warnings(&mut self) {
        if !self.warnings.is_empty() {
            tracing::info!("Cleared {} warnings", self.warnings.len());
            self.warnings.clear();
        }
    }

    pub fn is_alarming(&self) -> bool {
        self.phase == CoordinatorPhase::Alarming
    }
}

impl Default for CoordinatorStatus {
    fn default() -> Self {
        Self::new()
    }
}
