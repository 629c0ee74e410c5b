//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
};
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

use super::responses::{ApiResponse, HealthResponse, StartTimerRequest, StatusResponse};
use crate::{
    error::TimerError,
    state::{AppState, CoordinatorStatus},
};

type CommandResult = Result<Json<ApiResponse>, (StatusCode, Json<ApiResponse>)>;

/// Map a coordinator error to an HTTP error with the current status attached
fn failure(state: &AppState, action: &str, e: TimerError) -> (StatusCode, Json<ApiResponse>) {
    let code = match e {
        TimerError::InvalidDuration(_) => {
            warn!("Rejected {} request: {}", action, e);
            StatusCode::BAD_REQUEST
        }
        _ => {
            error!("Failed to {} timer: {}", action, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (code, Json(ApiResponse::error(e.to_string(), state.coordinator.status())))
}

fn respond(state: &AppState, action: &str, message: &str, result: Result<CoordinatorStatus, TimerError>) -> CommandResult {
    match result {
        Ok(status) => {
            info!("{} endpoint called - coordinator {:?}", action, status.phase);
            let message = match status.warnings.last() {
                Some(warning) if status.degraded => format!("{} ({})", message, warning),
                _ => message.to_string(),
            };
            Ok(Json(ApiResponse::from_status(message, status)))
        }
        Err(e) => Err(failure(state, action, e)),
    }
}

/// Handle POST /timer/start - Start (or restart) the timer
pub async fn start_timer_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartTimerRequest>,
) -> CommandResult {
    state.record_action("start");
    let label = request.label.filter(|label| !label.trim().is_empty());
    let result = state.coordinator.start_timer(request.duration_seconds, label).await;
    respond(&state, "start", "Timer started", result)
}

/// Handle POST /timer/pause
pub async fn pause_timer_handler(State(state): State<Arc<AppState>>) -> CommandResult {
    state.record_action("pause");
    let result = state.coordinator.pause_timer().await;
    respond(&state, "pause", "Timer paused", result)
}

/// Handle POST /timer/resume
pub async fn resume_timer_handler(State(state): State<Arc<AppState>>) -> CommandResult {
    state.record_action("resume");
    let result = state.coordinator.resume_timer().await;
    respond(&state, "resume", "Timer resumed", result)
}

/// Handle POST /timer/stop
pub async fn stop_timer_handler(State(state): State<Arc<AppState>>) -> CommandResult {
    state.record_action("stop");
    let result = state.coordinator.stop_timer().await;
    respond(&state, "stop", "Timer stopped", result)
}

/// Handle POST /alarm/acknowledge - Silence a finished timer
pub async fn acknowledge_alarm_handler(State(state): State<Arc<AppState>>) -> CommandResult {
    state.record_action("acknowledge");
    let result = state.coordinator.acknowledge_alarm().await;
    respond(&state, "acknowledge", "Alarm acknowledged", result)
}

/// Handle POST /ui/attach
pub async fn attach_ui_handler(State(state): State<Arc<AppState>>) -> CommandResult {
    state.record_action("attach");
    let result = state.coordinator.attach_ui().await;
    respond(&state, "attach", "UI attached", result)
}

/// Handle POST /ui/detach
pub async fn detach_ui_handler(State(state): State<Arc<AppState>>) -> CommandResult {
    state.record_action("detach");
    let status = state.coordinator.detach_ui().await;
    respond(&state, "detach", "UI detached", Ok(status))
}

/// Handle POST /warnings/dismiss
pub async fn dismiss_warnings_handler(State(state): State<Arc<AppState>>) -> Json<ApiResponse> {
    let status = state.coordinator.dismiss_warnings();
    Json(ApiResponse::from_status("Warnings dismissed".to_string(), status))
}

/// Handle GET /timer - Coordinator status
pub async fn timer_status_handler(State(state): State<Arc<AppState>>) -> Json<CoordinatorStatus> {
    Json(state.coordinator.status())
}

/// Handle GET /timer/events - Server-sent countdown for on-screen display
pub async fn timer_events_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let updates = state.coordinator.subscribe_display();
    let current = match state.coordinator.local_state().await {
        Some(local) => local,
        None => state.coordinator.durable_state(),
    };

    let stream = stream::unfold((updates, Some(current)), |(mut updates, pending)| async move {
        if let Some(timer) = pending {
            return Some((timer, (updates, None)));
        }
        loop {
            match updates.recv().await {
                Ok(timer) => return Some((timer, (updates, None))),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .map(|timer| Event::default().event("timer").json_data(timer));

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Handle GET /status - Return daemon status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let (last_action, last_action_time) = state.get_last_action();

    Json(StatusResponse {
        timer: state.coordinator.status(),
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    })
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
