//! Cooking Timer - a background countdown timer daemon
//!
//! This is the main entry point for the cooking-timer application.

use std::{path::Path, sync::Arc};

use tokio::net::TcpListener;
use tracing::{info, warn};

use cooking_timer::{
    api::create_router,
    config::{Config, GrantKind, NotifierKind},
    coordinator::TimerCoordinator,
    services::{
        AlertSink, DesktopNotifier, DurableGrant, LogNotifier, NotificationSurface, ProcessGrant,
        SessionStore, Sound, SoundAlerts, SystemdInhibitGrant,
    },
    state::AppState,
    tasks::{notification_relay_task, session_sync_task},
    utils::shutdown_signal,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing with appropriate log level
    tracing_subscriber::fmt()
        .with_env_filter(format!("cooking_timer={},tower_http=info", config.log_level()))
        .init();

    info!("Starting cooking-timer v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration: host={}, port={}, grant={:?}, notifier={:?}",
        config.host, config.port, config.grant, config.notifier
    );

    let grant: Arc<dyn DurableGrant> = match config.grant {
        GrantKind::Systemd => Arc::new(SystemdInhibitGrant::new()),
        GrantKind::Process => Arc::new(ProcessGrant::new()),
    };
    let alerts: Arc<dyn AlertSink> = Arc::new(SoundAlerts::new(
        load_sound(&config.tone_file).await,
        load_sound(&config.fallback_file).await,
        config.vibrate_command.as_deref(),
    ));

    // The one coordinator for the lifetime of the daemon
    let coordinator = TimerCoordinator::spawn(grant, alerts, config.coordinator_config());

    let surface: Option<Arc<dyn NotificationSurface>> = match config.notifier {
        NotifierKind::Desktop => Some(Arc::new(DesktopNotifier::default())),
        NotifierKind::Log => Some(Arc::new(LogNotifier)),
        NotifierKind::Off => None,
    };
    if let Some(surface) = surface {
        tokio::spawn(notification_relay_task(Arc::clone(&coordinator), surface));
    }

    if let Some(path) = &config.session_file {
        tokio::spawn(session_sync_task(Arc::clone(&coordinator), SessionStore::new(path)));
    }

    let state = Arc::new(AppState::new(Arc::clone(&coordinator), config.port, config.host.clone()));
    let app = create_router(state);

    // Bind to the specified address
    let addr = config.address();
    let listener = TcpListener::bind(&addr).await?;

    info!("Server running on http://{}", addr);
    info!("Endpoints:");
    info!("  POST /timer/start       - Start a timer {{duration_seconds, label}}");
    info!("  POST /timer/pause       - Pause the timer");
    info!("  POST /timer/resume      - Resume the timer");
    info!("  POST /timer/stop        - Stop the timer");
    info!("  POST /alarm/acknowledge - Silence a finished timer");
    info!("  POST /ui/attach         - Attach a display");
    info!("  POST /ui/detach         - Detach the display");
    info!("  GET  /timer             - Timer status");
    info!("  GET  /timer/events      - Countdown event stream");
    info!("  GET  /status            - Daemon status");
    info!("  GET  /health            - Health check");

    let server = axum::serve(listener, app);

    tokio::select! {
        result = server => {
            if let Err(e) = result {
                tracing::error!("Server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    coordinator.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// A sound that fails to load leaves its alert unsupported; the alarm loop
/// falls back past it.
async fn load_sound(path: &Path) -> Option<Sound> {
    match Sound::load(path).await {
        Ok(sound) => Some(sound),
        Err(e) => {
            warn!("Alert sound unavailable: {}", e);
            None
        }
    }
}
