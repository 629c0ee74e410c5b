//! Configuration and CLI argument handling

use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};

use crate::{coordinator::CoordinatorConfig, tasks::AlarmCadence};

/// How the daemon keeps running in the background
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GrantKind {
    /// Hold a systemd-inhibit lock against sleep while a timer runs
    Systemd,
    /// Rely on the daemon process alone
    Process,
}

/// Where the ongoing timer notification goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NotifierKind {
    Desktop,
    Log,
    Off,
}

/// CLI argument parsing structure
#[derive(Parser, Debug)]
#[command(name = "cooking-timer")]
#[command(about = "A background cooking timer with pause/resume and a looping alarm")]
#[command(version)]
pub struct Config {
    /// Port to bind the server to
    #[arg(short, long, default_value = "20554")]
    pub port: u16,

    /// Host address to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Background execution grant
    #[arg(long, value_enum, default_value = "systemd")]
    pub grant: GrantKind,

    /// Timer notification surface
    #[arg(long, value_enum, default_value = "desktop")]
    pub notifier: NotifierKind,

    /// Sound file played as the alarm tone
    #[arg(
        long,
        default_value = "/usr/share/sounds/freedesktop/stereo/alarm-clock-elapsed.oga"
    )]
    pub tone_file: PathBuf,

    /// Sound file played when the alarm tone cannot be
    #[arg(
        long,
        default_value = "/usr/share/sounds/freedesktop/stereo/complete.oga"
    )]
    pub fallback_file: PathBuf,

    /// Command receiving a comma-separated vibration pattern in milliseconds
    #[arg(long)]
    pub vibrate_command: Option<String>,

    /// Seconds of drift tolerated between the display and background timers
    #[arg(long, default_value = "2")]
    pub drift_threshold: u64,

    /// Alarm tone length in milliseconds
    #[arg(long, default_value = "300", value_parser = clap::value_parser!(u64).range(1..))]
    pub tone_ms: u64,

    /// Silence between alarm tones in milliseconds
    #[arg(long, default_value = "1000")]
    pub pause_ms: u64,

    /// File used to resume a timer after a restart
    #[arg(long)]
    pub session_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Parse configuration from command line arguments
    pub fn parse() -> Self {
        Parser::parse()
    }

    /// Get the server address as a formatted string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get the appropriate log level based on verbose flag
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "debug" } else { "info" }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            drift_threshold_seconds: self.drift_threshold,
            alarm: AlarmCadence {
                tone: Duration::from_millis(self.tone_ms),
                pause: Duration::from_millis(self.pause_ms),
                ..AlarmCadence::default()
            },
        }
    }
}
