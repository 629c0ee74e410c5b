//! Synchronous countdown state machine
//!
//! `TimerMachine` is the single writer of one `TimerState`. It knows nothing
//! about clocks: the async engine (or a test) feeds it ticks. Every operation
//! that replaces the countdown opens a new generation, and ticks tagged with
//! any other generation are rejected without touching the state.
//!
//! ```text
//!  Idle ──start──► Running ──tick(0)──► Finished
//!                   │   ▲                  │
//!             pause │   │ resume           │
//!                   ▼   │                  │
//!                  Paused                  │
//!  ▲                                       │
//!  └──────────────── stop (from any) ◄─────┘
//! ```

use tracing::debug;

use crate::{
    error::TimerError,
    state::{TimerEvent, TimerPhase, TimerState},
};

/// Validate a requested duration, rejecting zero and negative values
pub fn validate_duration(duration_seconds: i64) -> Result<u64, TimerError> {
    if duration_seconds <= 0 {
        return Err(TimerError::InvalidDuration(duration_seconds));
    }
    Ok(duration_seconds as u64)
}

#[derive(Debug, Default)]
pub struct TimerMachine {
    state: TimerState,
    generation: u64,
}

impl TimerMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current state tagged with the current generation
    pub fn event(&self) -> TimerEvent {
        TimerEvent {
            generation: self.generation,
            state: self.state.clone(),
        }
    }

    /// Begin a new countdown, discarding whatever was there before
    pub fn start(&mut self, duration_seconds: i64, label: Option<String>) -> Result<TimerEvent, TimerError> {
        let total = validate_duration(duration_seconds)?;
        if self.state.is_active() {
            debug!("Restarting over an active {} timer", self.state.phase);
        }
        self.generation += 1;
        self.state = TimerState::running(total, label);
        Ok(self.event())
    }

    /// Apply one elapsed second.
    ///
    /// Returns `Ok(None)` when the timer is not running; the tick is dropped.
    pub fn tick(&mut self, generation: u64) -> Result<Option<TimerEvent>, TimerError> {
        if generation != self.generation {
            return Err(TimerError::StaleEngine {
                current: self.generation,
                got: generation,
            });
        }
        if self.state.phase != TimerPhase::Running {
            return Ok(None);
        }

        self.state.remaining_seconds = self.state.remaining_seconds.saturating_sub(1);
        if self.state.remaining_seconds == 0 {
            self.state.phase = TimerPhase::Finished;
        }
        Ok(Some(self.event()))
    }

    pub fn pause(&mut self) -> Option<TimerEvent> {
        if self.state.phase != TimerPhase::Running {
            return None;
        }
        self.state.phase = TimerPhase::Paused;
        Some(self.event())
    }

    pub fn resume(&mut self) -> Option<TimerEvent> {
        if self.state.phase != TimerPhase::Paused {
            return None;
        }
        self.state.phase = TimerPhase::Running;
        Some(self.event())
    }

    /// Reset to Idle. Always produces an event.
    pub fn stop(&mut self) -> TimerEvent {
        self.generation += 1;
        self.state = TimerState::idle();
        self.event()
    }

    /// Restart the countdown from an authoritative remaining value, keeping
    /// phase, total and label. Zero finishes the timer.
    pub fn resync(&mut self, remaining_seconds: u64) -> Option<TimerEvent> {
        if !self.state.is_active() {
            return None;
        }
        if remaining_seconds == 0 {
            return self.force_finish();
        }
        self.generation += 1;
        self.state.remaining_seconds = remaining_seconds.min(self.state.total_duration_seconds);
        Some(self.event())
    }

    /// Jump straight to Finished regardless of the local count
    pub fn force_finish(&mut self) -> Option<TimerEvent> {
        if !self.state.is_active() {
            return None;
        }
        self.state.remaining_seconds = 0;
        self.state.phase = TimerPhase::Finished;
        Some(self.event())
    }

    /// Adopt a snapshot produced elsewhere, normalised so the invariants hold
    pub fn restore(&mut self, mut state: TimerState) -> TimerEvent {
        state.remaining_seconds = state.remaining_seconds.min(state.total_duration_seconds);
        match state.phase {
            TimerPhase::Idle => state = TimerState::idle(),
            TimerPhase::Finished => state.remaining_seconds = 0,
            TimerPhase::Running | TimerPhase::Paused if state.remaining_seconds == 0 => {
                state.phase = TimerPhase::Finished;
            }
            TimerPhase::Running | TimerPhase::Paused => {}
        }
        self.generation += 1;
        self.state = state;
        self.event()
    }
}
