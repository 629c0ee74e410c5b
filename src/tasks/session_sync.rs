//! Persists the authoritative timer for resumption after a restart

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::{
    coordinator::TimerCoordinator,
    services::SessionStore,
    state::TimerEvent,
};

/// Resume a saved session, if any, then keep the session file current.
///
/// Only phase or generation changes are written: a running timer's
/// remaining time is recomputed from the save time on load.
pub async fn session_sync_task(coordinator: Arc<TimerCoordinator>, store: SessionStore) {
    info!("Starting session sync task ({})", store.path().display());

    let mut events = coordinator.subscribe_authoritative();

    match store.load().await {
        Ok(Some(record)) => match record.resume_state(chrono::Utc::now()) {
            Some(state) => {
                info!("Resuming saved timer: {} at {}s", state.phase, state.remaining_seconds);
                if let Err(e) = coordinator.restore_timer(state).await {
                    warn!("Failed to resume saved timer: {}", e);
                }
            }
            None => debug!("Saved session has nothing to resume"),
        },
        Ok(None) => debug!("No saved session"),
        Err(e) => warn!("Ignoring unreadable session file: {}", e),
    }
    drop(coordinator);

    let mut last_saved: Option<TimerEvent> = None;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                debug!("Session sync skipped {} updates", missed);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let changed = last_saved.as_ref().map_or(true, |last| {
            last.generation != event.generation || last.state.phase != event.state.phase
        });
        if !changed {
            continue;
        }

        match store.save(&event.state).await {
            Ok(()) => last_saved = Some(event),
            Err(e) => warn!("Failed to save timer session: {}", e),
        }
    }

    debug!("Session sync exited");
}
