//! Keeps the persistent notification in step with the authoritative timer

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::{
    coordinator::TimerCoordinator,
    services::{NotificationContent, NotificationSurface},
    state::TimerPhase,
};

/// Background task rendering every authoritative snapshot as a notification
pub async fn notification_relay_task(coordinator: Arc<TimerCoordinator>, surface: Arc<dyn NotificationSurface>) {
    info!("Starting notification relay task");

    let mut events = coordinator.subscribe_authoritative();
    drop(coordinator);
    let mut last_phase = TimerPhase::Idle;

    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                debug!("Notification relay skipped {} updates", missed);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let phase = event.state.phase;
        let result = match NotificationContent::from_state(&event.state) {
            Some(content) => surface.render(&content).await,
            None if last_phase != TimerPhase::Idle => surface.clear().await,
            None => Ok(()),
        };
        if let Err(e) = result {
            warn!("Failed to update timer notification: {}", e);
        }
        last_phase = phase;
    }

    debug!("Notification relay exited");
}
