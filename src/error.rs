//! Error types for the timer engine and its host adapters

use thiserror::Error;

/// Errors raised by the timer engine and coordinator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimerError {
    /// Start requested with a non-positive duration. No state was changed.
    #[error("timer duration must be positive, got {0} seconds")]
    InvalidDuration(i64),

    /// The durable execution context could not be acquired or renewed.
    #[error("background execution unavailable: {0}")]
    BackgroundGrantUnavailable(String),

    /// The primary alert mechanism failed for one alarm cycle.
    #[error("alert playback failed: {0}")]
    AlertPlayback(String),

    /// A tick or command tagged with a superseded engine generation.
    #[error("stale engine generation {got} (current {current})")]
    StaleEngine { current: u64, got: u64 },

    /// The engine task is gone (host torn down).
    #[error("timer engine is no longer running")]
    EngineClosed,
}

/// Errors from acquiring or releasing the durable execution grant
#[derive(Error, Debug)]
pub enum GrantError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} exited before the grant could be held")]
    Exited(String),
}

impl From<GrantError> for TimerError {
    fn from(e: GrantError) -> Self {
        TimerError::BackgroundGrantUnavailable(e.to_string())
    }
}

/// Errors from the host's alert primitives
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("failed to execute {command}: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} failed: {stderr}")]
    Failed { command: String, stderr: String },

    #[error("{0} is not supported on this host")]
    Unsupported(&'static str),

    #[error("failed to read sound {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("sound could not be decoded: {0}")]
    Decode(String),

    #[error("audio output unavailable: {0}")]
    Device(String),

    #[error("audio output stalled for {0:?}")]
    Stalled(std::time::Duration),

    #[error("desktop notification failed: {0}")]
    Notification(String),
}

impl From<AlertError> for TimerError {
    fn from(e: AlertError) -> Self {
        TimerError::AlertPlayback(e.to_string())
    }
}

/// Errors from the session resumption store
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("session file is not valid: {0}")]
    Format(#[from] serde_json::Error),
}
