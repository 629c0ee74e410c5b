//! Persistent timer notification

use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt};
use notify_rust::{Notification, NotificationHandle, Timeout, Urgency};
use serde::{Deserialize, Serialize};
use tokio::task;
use tracing::{debug, info};

use crate::{
    error::AlertError,
    state::{TimerPhase, TimerState},
    utils::format_clock,
};

const APP_NAME: &str = "Cooking Timer";

/// Buttons offered on the notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationAction {
    Pause,
    Resume,
    Stop,
}

impl NotificationAction {
    /// Identifier reported back when the button is pressed
    pub fn id(self) -> &'static str {
        match self {
            NotificationAction::Pause => "pause",
            NotificationAction::Resume => "resume",
            NotificationAction::Stop => "stop",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            NotificationAction::Pause => "Pause",
            NotificationAction::Resume => "Resume",
            NotificationAction::Stop => "Stop",
        }
    }
}

/// What the notification should show for one timer snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub actions: Vec<NotificationAction>,
    pub urgent: bool,
}

impl NotificationContent {
    /// Content for a snapshot; `None` when there is nothing to show
    pub fn from_state(state: &TimerState) -> Option<Self> {
        let clock = format_clock(state.remaining_seconds);
        let countdown = match &state.label {
            Some(label) => format!("{} - {}", label, clock),
            None => clock,
        };

        let content = match state.phase {
            TimerPhase::Idle => return None,
            TimerPhase::Running => Self {
                title: APP_NAME.to_string(),
                body: countdown,
                actions: vec![NotificationAction::Pause, NotificationAction::Stop],
                urgent: false,
            },
            TimerPhase::Paused => Self {
                title: APP_NAME.to_string(),
                body: format!("{} (paused)", countdown),
                actions: vec![NotificationAction::Resume, NotificationAction::Stop],
                urgent: false,
            },
            TimerPhase::Finished => Self {
                title: "Timer Finished".to_string(),
                body: state
                    .label
                    .clone()
                    .unwrap_or_else(|| "Your timer has finished!".to_string()),
                actions: vec![NotificationAction::Stop],
                urgent: true,
            },
        };
        Some(content)
    }
}

/// Somewhere to show the ongoing timer notification
pub trait NotificationSurface: Send + Sync {
    fn render<'a>(&'a self, content: &'a NotificationContent) -> BoxFuture<'a, Result<(), AlertError>>;

    fn clear(&self) -> BoxFuture<'_, Result<(), AlertError>>;
}

/// Desktop notification over D-Bus. One notification is kept per timer
/// and updated in place until it is cleared.
#[derive(Default)]
pub struct DesktopNotifier {
    shown: Arc<Mutex<Option<NotificationHandle>>>,
}

impl std::fmt::Debug for DesktopNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shown = self.shown.lock().unwrap_or_else(PoisonError::into_inner).is_some();
        f.debug_struct("DesktopNotifier").field("shown", &shown).finish()
    }
}

impl NotificationSurface for DesktopNotifier {
    fn render<'a>(&'a self, content: &'a NotificationContent) -> BoxFuture<'a, Result<(), AlertError>> {
        let shown = Arc::clone(&self.shown);
        let notification = build_notification(content);
        async move {
            task::spawn_blocking(move || {
                let mut shown = shown.lock().unwrap_or_else(PoisonError::into_inner);
                match shown.as_mut() {
                    Some(handle) => {
                        **handle = notification;
                        handle.update();
                    }
                    None => {
                        let handle = notification
                            .show()
                            .map_err(|e| AlertError::Notification(e.to_string()))?;
                        *shown = Some(handle);
                    }
                }
                Ok::<(), AlertError>(())
            })
            .await
            .map_err(|e| AlertError::Notification(e.to_string()))?
        }
        .boxed()
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), AlertError>> {
        let shown = self.shown.lock().unwrap_or_else(PoisonError::into_inner).take();
        async move {
            let Some(handle) = shown else {
                return Ok(());
            };
            task::spawn_blocking(move || handle.close())
                .await
                .map_err(|e| AlertError::Notification(e.to_string()))?;
            debug!("Desktop notification closed");
            Ok(())
        }
        .boxed()
    }
}

fn build_notification(content: &NotificationContent) -> Notification {
    let mut notification = Notification::new();
    notification
        .appname(APP_NAME)
        .summary(&content.title)
        .body(&content.body)
        .icon("alarm")
        .timeout(Timeout::Never)
        .urgency(if content.urgent { Urgency::Critical } else { Urgency::Low });
    for action in &content.actions {
        notification.action(action.id(), action.label());
    }
    notification
}

/// Notifications as log lines, for headless hosts
#[derive(Debug, Default)]
pub struct LogNotifier;

impl NotificationSurface for LogNotifier {
    fn render<'a>(&'a self, content: &'a NotificationContent) -> BoxFuture<'a, Result<(), AlertError>> {
        if content.urgent {
            info!("[{}] {}", content.title, content.body);
        } else {
            debug!("[{}] {} {:?}", content.title, content.body, content.actions);
        }
        futures::future::ready(Ok(())).boxed()
    }

    fn clear(&self) -> BoxFuture<'_, Result<(), AlertError>> {
        debug!("Notification cleared");
        futures::future::ready(Ok(())).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_offers_pause_and_stop() {
        let state = TimerState::running(125, Some("Boil pasta".to_string()));
        let content = NotificationContent::from_state(&state).unwrap();
        assert_eq!(content.title, "Cooking Timer");
        assert_eq!(content.body, "Boil pasta - 02:05");
        assert_eq!(content.actions, vec![NotificationAction::Pause, NotificationAction::Stop]);
        assert!(!content.urgent);
    }

    #[test]
    fn paused_offers_resume() {
        let mut state = TimerState::running(60, None);
        state.phase = TimerPhase::Paused;
        let content = NotificationContent::from_state(&state).unwrap();
        assert_eq!(content.body, "01:00 (paused)");
        assert_eq!(content.actions[0], NotificationAction::Resume);
    }

    #[test]
    fn finished_is_urgent_with_default_text() {
        let state = TimerState {
            total_duration_seconds: 60,
            remaining_seconds: 0,
            label: None,
            phase: TimerPhase::Finished,
        };
        let content = NotificationContent::from_state(&state).unwrap();
        assert_eq!(content.title, "Timer Finished");
        assert_eq!(content.body, "Your timer has finished!");
        assert!(content.urgent);
    }

    #[test]
    fn idle_shows_nothing() {
        assert!(NotificationContent::from_state(&TimerState::idle()).is_none());
    }

    #[test]
    fn desktop_notification_carries_the_buttons() {
        let content = NotificationContent::from_state(&TimerState::running(90, Some("Rice".to_string()))).unwrap();
        let notification = build_notification(&content);
        assert_eq!(notification.summary, "Cooking Timer");
        assert_eq!(notification.body, "Rice - 01:30");
        assert_eq!(notification.actions, vec!["pause", "Pause", "stop", "Stop"]);
    }

    #[tokio::test]
    async fn clearing_with_nothing_shown_is_ok() {
        let notifier = DesktopNotifier::default();
        assert!(notifier.clear().await.is_ok());
    }
}
