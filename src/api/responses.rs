//! API request and response structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::state::{CoordinatorPhase, CoordinatorStatus};

/// Body of `POST /timer/start`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartTimerRequest {
    pub duration_seconds: i64,
    #[serde(default)]
    pub label: Option<String>,
}

/// API response structure for command endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub timer: CoordinatorStatus,
}

impl ApiResponse {
    /// Create a new API response
    pub fn new(status: String, message: String, timer: CoordinatorStatus) -> Self {
        Self {
            status,
            message,
            timestamp: Utc::now(),
            timer,
        }
    }

    /// Response whose status word reflects the coordinator: `degraded` takes
    /// precedence, then `alarming`, `active`, `inactive`
    pub fn from_status(message: String, timer: CoordinatorStatus) -> Self {
        let status = if timer.degraded {
            "degraded"
        } else {
            match timer.phase {
                CoordinatorPhase::Alarming => "alarming",
                CoordinatorPhase::Active | CoordinatorPhase::Starting => "active",
                CoordinatorPhase::NoTimer => "inactive",
            }
        };
        Self::new(status.to_string(), message, timer)
    }

    /// Create an error response
    pub fn error(message: String, timer: CoordinatorStatus) -> Self {
        Self::new("error".to_string(), message, timer)
    }
}

/// Daemon status with the timer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub timer: CoordinatorStatus,
    pub uptime: String,
    pub port: u16,
    pub host: String,
    pub last_action: Option<String>,
    pub last_action_time: Option<DateTime<Utc>>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

impl HealthResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
