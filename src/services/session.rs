//! Session resumption across daemon restarts
//!
//! The durable timer is saved as a flat JSON object whenever its phase or
//! generation changes. A running timer is stored with the wall-clock time of
//! the save so the remaining time can be recomputed on load.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    error::SessionError,
    state::{TimerPhase, TimerState},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub total_duration_seconds: u64,
    pub remaining_seconds: u64,
    pub label: Option<String>,
    pub phase: TimerPhase,
    pub saved_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn capture(state: &TimerState, saved_at: DateTime<Utc>) -> Self {
        Self {
            total_duration_seconds: state.total_duration_seconds,
            remaining_seconds: state.remaining_seconds,
            label: state.label.clone(),
            phase: state.phase,
            saved_at,
        }
    }

    /// The state to resume at `now`, or `None` if there is nothing to resume
    pub fn resume_state(&self, now: DateTime<Utc>) -> Option<TimerState> {
        let mut state = TimerState {
            total_duration_seconds: self.total_duration_seconds,
            remaining_seconds: self.remaining_seconds,
            label: self.label.clone(),
            phase: self.phase,
        };

        match self.phase {
            TimerPhase::Idle => return None,
            TimerPhase::Running => {
                let elapsed = (now - self.saved_at).num_seconds().max(0) as u64;
                state.remaining_seconds = self.remaining_seconds.saturating_sub(elapsed);
                if state.remaining_seconds == 0 {
                    state.phase = TimerPhase::Finished;
                }
            }
            TimerPhase::Paused | TimerPhase::Finished => {}
        }
        Some(state)
    }
}

/// Key-value session file
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a snapshot; Idle removes the file
    pub async fn save(&self, state: &TimerState) -> Result<(), SessionError> {
        if state.phase == TimerPhase::Idle {
            return self.clear().await;
        }

        let record = SessionRecord::capture(state, Utc::now());
        let json = serde_json::to_vec_pretty(&record)?;

        // Write-then-rename so a crash never leaves half a file
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!("Session saved: {} at {}s", record.phase, record.remaining_seconds);
        Ok(())
    }

    pub async fn load(&self) -> Result<Option<SessionRecord>, SessionError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    pub async fn clear(&self) -> Result<(), SessionError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Session cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
