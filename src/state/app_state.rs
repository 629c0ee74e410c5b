//! Daemon-wide application state

use std::{
    sync::{Arc, Mutex},
    time::Instant,
};

use chrono::{DateTime, Utc};

use crate::{coordinator::TimerCoordinator, utils::format_uptime};

/// Shared by every HTTP handler
#[derive(Debug)]
pub struct AppState {
    /// The one authoritative timer coordinator
    pub coordinator: Arc<TimerCoordinator>,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    /// Last command received, with its time
    last_action: Mutex<Option<(String, DateTime<Utc>)>>,
}

impl AppState {
    pub fn new(coordinator: Arc<TimerCoordinator>, port: u16, host: String) -> Self {
        Self {
            coordinator,
            start_time: Instant::now(),
            port,
            host,
            last_action: Mutex::new(None),
        }
    }

    /// Remember the last command for the status endpoint
    pub fn record_action(&self, action: &str) {
        if let Ok(mut last) = self.last_action.lock() {
            *last = Some((action.to_string(), Utc::now()));
        }
    }

    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        match self.last_action.lock().ok().and_then(|last| last.clone()) {
            Some((action, time)) => (Some(action), Some(time)),
            None => (None, None),
        }
    }

    pub fn get_uptime(&self) -> String {
        format_uptime(self.start_time.elapsed())
    }
}
