//! Durable/local timer coordination
//!
//! The coordinator owns two engines. The durable engine lives as long as the
//! coordinator and is backed by a `DurableGrant`; it is the authority on how
//! much time is left. The local engine is scoped to an attached UI and ticks
//! on its own for smooth display. The two never share state: the durable
//! engine's snapshots are relayed by value and the local engine is resynced
//! only when it drifts past a threshold.

use std::sync::{Arc, Weak};

use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        watch, Mutex,
    },
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    engine::{validate_duration, TimerEngine},
    error::TimerError,
    services::{AlertSink, DurableGrant},
    state::{CoordinatorPhase, CoordinatorStatus, TimerEvent, TimerPhase, TimerState},
    tasks::{spawn_alarm, AlarmCadence, AlarmHandle},
};

const STREAM_CAPACITY: usize = 128;

/// Tunables for the coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Local drift tolerated before the local engine is resynced
    pub drift_threshold_seconds: u64,
    pub alarm: AlarmCadence,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            drift_threshold_seconds: 2,
            alarm: AlarmCadence::default(),
        }
    }
}

/// UI-scoped engine plus the task relaying its events
#[derive(Debug)]
struct LocalEngine {
    id: u64,
    engine: TimerEngine,
    relay: JoinHandle<()>,
}

impl Drop for LocalEngine {
    fn drop(&mut self) {
        self.relay.abort();
    }
}

#[derive(Debug, Default)]
struct Inner {
    local: Option<LocalEngine>,
    next_local_id: u64,
    alarm: Option<AlarmHandle>,
    /// Local-only: the grant could not be obtained
    degraded: bool,
}

/// Single authority over the cooking timer
pub struct TimerCoordinator {
    this: Weak<TimerCoordinator>,
    durable: TimerEngine,
    grant: Arc<dyn DurableGrant>,
    alerts: Arc<dyn AlertSink>,
    config: CoordinatorConfig,
    inner: Mutex<Inner>,
    status_tx: watch::Sender<CoordinatorStatus>,
    display_tx: broadcast::Sender<TimerState>,
    authoritative_tx: broadcast::Sender<TimerEvent>,
}

impl std::fmt::Debug for TimerCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerCoordinator")
            .field("durable", &self.durable)
            .field("config", &self.config)
            .field("status", &*self.status_tx.borrow())
            .finish_non_exhaustive()
    }
}

impl TimerCoordinator {
    /// Create the coordinator with a UI attached. Must be called inside a
    /// tokio runtime.
    pub fn spawn(
        grant: Arc<dyn DurableGrant>,
        alerts: Arc<dyn AlertSink>,
        config: CoordinatorConfig,
    ) -> Arc<Self> {
        let durable = TimerEngine::spawn("durable");
        let durable_events = durable.subscribe();
        let (status_tx, _) = watch::channel(CoordinatorStatus::new());
        let (display_tx, _) = broadcast::channel(STREAM_CAPACITY);
        let (authoritative_tx, _) = broadcast::channel(STREAM_CAPACITY);

        let coordinator = Arc::new_cyclic(|this: &Weak<Self>| {
            let inner = Inner {
                local: Some(spawn_local(this.clone(), 0)),
                next_local_id: 1,
                ..Inner::default()
            };
            Self {
                this: this.clone(),
                durable,
                grant,
                alerts,
                config,
                inner: Mutex::new(inner),
                status_tx,
                display_tx,
                authoritative_tx,
            }
        });

        tokio::spawn(relay_durable(Arc::downgrade(&coordinator), durable_events));
        info!("Timer coordinator ready");
        coordinator
    }

    /// Start a timer on both engines, replacing any existing one.
    ///
    /// Only an invalid duration is an error. If the background grant is
    /// unavailable the timer runs local-only and the status carries a warning.
    pub async fn start_timer(&self, duration_seconds: i64, label: Option<String>) -> Result<CoordinatorStatus, TimerError> {
        validate_duration(duration_seconds)?;

        let mut inner = self.inner.lock().await;
        if let Some(alarm) = inner.alarm.take() {
            info!("New timer requested while alarming, silencing alarm");
            alarm.stop().await;
        }
        self.status_tx.send_modify(|status| status.phase = CoordinatorPhase::Starting);

        let durable_result = match self.grant.acquire().await {
            Ok(()) => self.durable.start(duration_seconds, label.clone()).await.map(|_| ()),
            Err(e) => Err(TimerError::from(e)),
        };

        inner.degraded = match durable_result {
            Ok(()) => false,
            Err(e) => {
                warn!("Durable timer unavailable, running local-only: {}", e);
                if let Err(e) = self.durable.stop().await {
                    warn!("Failed to reset durable timer: {}", e);
                }
                self.grant.release().await;
                self.status_tx.send_modify(|status| {
                    status.add_warning(format!("{}. The timer will not survive backgrounding.", e))
                });
                true
            }
        };

        let local = self.ensure_local(&mut inner);
        let started = local.engine.start(duration_seconds, label).await?;
        info!(
            "Timer started: {}s{}",
            started.state.total_duration_seconds,
            if inner.degraded { " (local-only)" } else { "" }
        );

        Ok(self.refresh_status(&inner))
    }

    /// Pause the durable engine first; the local engine follows only if that
    /// took effect.
    pub async fn pause_timer(&self) -> Result<CoordinatorStatus, TimerError> {
        let inner = self.inner.lock().await;
        if !inner.degraded {
            self.durable.pause().await?;
        }
        if let Some(local) = &inner.local {
            local.engine.pause().await?;
        }
        Ok(self.refresh_status(&inner))
    }

    /// Resume the durable engine first, then the local one
    pub async fn resume_timer(&self) -> Result<CoordinatorStatus, TimerError> {
        let inner = self.inner.lock().await;
        if !inner.degraded {
            self.durable.resume().await?;
        }
        if let Some(local) = &inner.local {
            local.engine.resume().await?;
        }
        Ok(self.refresh_status(&inner))
    }

    /// Stop everything: both engines, the alarm, and the grant.
    ///
    /// Every step runs even if an earlier one fails; the first failure is
    /// returned afterwards.
    pub async fn stop_timer(&self) -> Result<CoordinatorStatus, TimerError> {
        let mut inner = self.inner.lock().await;

        if let Some(alarm) = inner.alarm.take() {
            alarm.stop().await;
        }

        let durable_result = self.durable.stop().await.map(|_| ());
        let local_result = match &inner.local {
            Some(local) => local.engine.stop().await.map(|_| ()),
            None => Ok(()),
        };
        self.grant.release().await;
        inner.degraded = false;

        info!("Timer stopped");
        let status = self.refresh_status(&inner);
        durable_result.and(local_result).map(|_| status)
    }

    /// Acknowledge a ringing alarm. The finished timer is cleared.
    pub async fn acknowledge_alarm(&self) -> Result<CoordinatorStatus, TimerError> {
        let alarming = self.inner.lock().await.alarm.is_some();
        if !alarming {
            debug!("No alarm to acknowledge");
            return Ok(self.status());
        }
        info!("Alarm acknowledged");
        self.stop_timer().await
    }

    /// Reconcile the local engine against an authoritative remaining time.
    ///
    /// Returns the local state if it was changed.
    pub async fn reconcile(&self, remote_remaining_seconds: u64) -> Result<Option<TimerState>, TimerError> {
        let inner = self.inner.lock().await;
        self.reconcile_locked(&inner, remote_remaining_seconds).await
    }

    /// Bring up a fresh UI-scoped engine seeded from the durable snapshot
    pub async fn attach_ui(&self) -> Result<CoordinatorStatus, TimerError> {
        let mut inner = self.inner.lock().await;
        if inner.local.is_some() {
            debug!("UI already attached");
            return Ok(self.refresh_status(&inner));
        }

        let snapshot = self.durable.current_state();
        let local = self.ensure_local(&mut inner);
        if snapshot.phase != TimerPhase::Idle {
            local.engine.restore(snapshot).await?;
        }
        info!("UI attached");
        Ok(self.refresh_status(&inner))
    }

    /// Tear down the UI-scoped engine. The durable timer keeps running; a
    /// local-only timer is lost.
    pub async fn detach_ui(&self) -> CoordinatorStatus {
        let mut inner = self.inner.lock().await;
        let Some(local) = inner.local.take() else {
            return self.refresh_status(&inner);
        };

        if inner.degraded && local.engine.current_state().is_active() {
            warn!("Local-only timer discarded with its UI");
            inner.degraded = false;
            self.status_tx.send_modify(|status| {
                status.add_warning("Timer lost: it could not run in the background.".to_string())
            });
            let _ = self.authoritative_tx.send(self.durable.current_event());
        }
        drop(local);
        info!("UI detached");
        self.refresh_status(&inner)
    }

    /// Resume a timer saved by a previous run of the daemon
    pub async fn restore_timer(&self, state: TimerState) -> Result<CoordinatorStatus, TimerError> {
        let mut inner = self.inner.lock().await;

        inner.degraded = match self.grant.acquire().await {
            Ok(()) => {
                self.durable.restore(state.clone()).await?;
                false
            }
            Err(e) => {
                let e = TimerError::from(e);
                warn!("Restoring timer local-only: {}", e);
                self.status_tx.send_modify(|status| {
                    status.add_warning(format!("{}. The timer will not survive backgrounding.", e))
                });
                true
            }
        };

        let local = self.ensure_local(&mut inner);
        let restored = local.engine.restore(state).await?;
        info!("Timer restored: {} at {}s", restored.state.phase, restored.state.remaining_seconds);
        Ok(self.refresh_status(&inner))
    }

    /// Release host resources on daemon shutdown. Timers are left as they are
    /// so a saved session can pick them up.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(alarm) = inner.alarm.take() {
            alarm.stop().await;
        }
        self.grant.release().await;
        info!("Timer coordinator shut down");
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<CoordinatorStatus> {
        self.status_tx.subscribe()
    }

    /// Local engine snapshots, for on-screen countdowns
    pub fn subscribe_display(&self) -> broadcast::Receiver<TimerState> {
        self.display_tx.subscribe()
    }

    /// Authoritative snapshots (durable, or local in degraded mode), for the
    /// notification renderer and session persistence
    pub fn subscribe_authoritative(&self) -> broadcast::Receiver<TimerEvent> {
        self.authoritative_tx.subscribe()
    }

    pub fn durable_state(&self) -> TimerState {
        self.durable.current_state()
    }

    /// Local engine state, if a UI is attached
    pub async fn local_state(&self) -> Option<TimerState> {
        let inner = self.inner.lock().await;
        inner.local.as_ref().map(|local| local.engine.current_state())
    }

    pub fn dismiss_warnings(&self) -> CoordinatorStatus {
        self.status_tx.send_modify(|status| status.clear_warnings());
        self.status()
    }

    async fn on_durable_event(&self, event: TimerEvent) {
        let mut inner = self.inner.lock().await;

        let latest = self.durable.current_event();
        if event.generation != latest.generation {
            let stale = TimerError::StaleEngine {
                current: latest.generation,
                got: event.generation,
            };
            debug!("Dropping durable event: {}", stale);
            return;
        }
        if inner.degraded {
            return;
        }

        if event.state.is_active() && !self.grant.is_held() {
            match self.grant.acquire().await {
                Ok(()) => info!("Background grant renewed"),
                Err(e) => {
                    self.fall_back_to_local(&mut inner, &event.state, TimerError::from(e)).await;
                    return;
                }
            }
        }

        let _ = self.authoritative_tx.send(event.clone());
        if event != latest {
            // A newer snapshot is queued behind this one; reconcile against that
            return;
        }
        let state = &event.state;

        match state.phase {
            TimerPhase::Running | TimerPhase::Paused => {
                let local_phase = inner.local.as_ref().map(|local| local.engine.current_state().phase);
                match local_phase {
                    Some(phase) if phase == state.phase => {
                        if let Err(e) = self.reconcile_locked(&inner, state.remaining_seconds).await {
                            warn!("Failed to reconcile local timer: {}", e);
                        }
                    }
                    Some(phase) => {
                        debug!("Local timer {} while durable is {}, restoring", phase, state.phase);
                        if let Some(local) = &inner.local {
                            if let Err(e) = local.engine.restore(state.clone()).await {
                                warn!("Failed to restore local timer: {}", e);
                            }
                        }
                    }
                    None => {}
                }
            }
            TimerPhase::Finished => {
                if let Err(e) = self.reconcile_locked(&inner, 0).await {
                    warn!("Failed to finish local timer: {}", e);
                }
                self.enter_alarm(&mut inner, state.label.clone());
            }
            TimerPhase::Idle => {}
        }

        self.refresh_status(&inner);
    }

    async fn on_local_event(&self, local_id: u64, event: TimerEvent) {
        let mut inner = self.inner.lock().await;

        let Some(local) = &inner.local else { return };
        let current = local.engine.current_event().generation;
        if local.id != local_id || event.generation != current {
            debug!("Dropping stale local event from engine #{} generation {}", local_id, event.generation);
            return;
        }

        let _ = self.display_tx.send(event.state.clone());

        if inner.degraded {
            let _ = self.authoritative_tx.send(event.clone());
            if event.state.is_finished() {
                self.enter_alarm(&mut inner, event.state.label.clone());
            }
        }

        self.refresh_status(&inner);
    }

    async fn reconcile_locked(&self, inner: &Inner, remote_remaining_seconds: u64) -> Result<Option<TimerState>, TimerError> {
        let Some(local) = &inner.local else {
            return Ok(None);
        };
        let local_state = local.engine.current_state();
        if !local_state.is_active() {
            return Ok(None);
        }

        if remote_remaining_seconds == 0 {
            debug!("Remote timer finished, finishing local timer");
            return Ok(Some(local.engine.force_finish().await?.state));
        }

        let drift = local_state.remaining_seconds.abs_diff(remote_remaining_seconds);
        if drift > self.config.drift_threshold_seconds {
            debug!(
                "Syncing timer: {}s -> {}s",
                local_state.remaining_seconds, remote_remaining_seconds
            );
            return Ok(Some(local.engine.resync(remote_remaining_seconds).await?.state));
        }

        Ok(None)
    }

    /// The grant went away mid-timer and could not be renewed: hand the
    /// timer over to the local engine.
    async fn fall_back_to_local(&self, inner: &mut Inner, state: &TimerState, error: TimerError) {
        warn!("Background grant lost, continuing local-only: {}", error);
        inner.degraded = true;

        let local_active = self.ensure_local(inner).engine.current_state().is_active();
        let local_result = if local_active {
            self.reconcile_locked(inner, state.remaining_seconds).await.map(|_| ())
        } else {
            match &inner.local {
                Some(local) => local.engine.restore(state.clone()).await.map(|_| ()),
                None => Ok(()),
            }
        };
        if let Err(e) = local_result {
            warn!("Failed to hand timer to local engine: {}", e);
        }

        if let Err(e) = self.durable.stop().await {
            warn!("Failed to reset durable timer: {}", e);
        }
        self.grant.release().await;
        self.status_tx.send_modify(|status| {
            status.add_warning(format!("{}. The timer will not survive backgrounding.", error))
        });

        if let Some(local) = &inner.local {
            let _ = self.authoritative_tx.send(local.engine.current_event());
        }
        self.refresh_status(inner);
    }

    fn enter_alarm(&self, inner: &mut Inner, label: Option<String>) {
        if inner.alarm.is_some() {
            return;
        }
        info!("Timer finished, entering alarm mode");
        inner.alarm = Some(spawn_alarm(self.alerts.clone(), self.config.alarm.clone(), label));
        self.status_tx.send_modify(|status| status.alarms_entered += 1);
    }

    fn ensure_local<'a>(&self, inner: &'a mut Inner) -> &'a LocalEngine {
        let this = self.this.clone();
        let next_id = &mut inner.next_local_id;
        inner.local.get_or_insert_with(|| {
            let id = *next_id;
            *next_id += 1;
            debug!("Creating local engine #{}", id);
            spawn_local(this, id)
        })
    }

    /// Recompute the derived parts of the status and publish it
    fn refresh_status(&self, inner: &Inner) -> CoordinatorStatus {
        let timer = if inner.degraded {
            inner
                .local
                .as_ref()
                .map(|local| local.engine.current_state())
                .unwrap_or_default()
        } else {
            self.durable.current_state()
        };

        let phase = if inner.alarm.is_some() {
            CoordinatorPhase::Alarming
        } else if timer.phase == TimerPhase::Idle {
            CoordinatorPhase::NoTimer
        } else {
            CoordinatorPhase::Active
        };

        self.status_tx.send_modify(|status| {
            status.phase = phase;
            status.degraded = inner.degraded;
            status.grant_held = self.grant.is_held();
            status.ui_attached = inner.local.is_some();
            status.timer = timer;
        });
        self.status()
    }
}

fn spawn_local(coordinator: Weak<TimerCoordinator>, id: u64) -> LocalEngine {
    let engine = TimerEngine::spawn("local");
    let events = engine.subscribe();
    let relay = tokio::spawn(relay_local(coordinator, id, events));
    LocalEngine { id, engine, relay }
}

async fn relay_durable(coordinator: Weak<TimerCoordinator>, mut events: broadcast::Receiver<TimerEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(event) => Some(event),
            Err(RecvError::Lagged(missed)) => {
                warn!("Durable relay lagged by {} events, catching up", missed);
                None
            }
            Err(RecvError::Closed) => break,
        };

        let Some(coordinator) = coordinator.upgrade() else { break };
        let event = event.unwrap_or_else(|| coordinator.durable.current_event());
        coordinator.on_durable_event(event).await;
    }
    debug!("Durable relay exited");
}

async fn relay_local(coordinator: Weak<TimerCoordinator>, id: u64, mut events: broadcast::Receiver<TimerEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let Some(coordinator) = coordinator.upgrade() else { break };
                coordinator.on_local_event(id, event).await;
            }
            Err(RecvError::Lagged(missed)) => debug!("Local relay #{} lagged by {} events", id, missed),
            Err(RecvError::Closed) => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::Ordering, time::Duration};

    use tokio::time::sleep;

    use super::*;
    use crate::{
        services::ProcessGrant,
        test_support::{DeniedGrant, RecordingAlerts, RevocableGrant},
    };

    fn coordinator_with(grant: Arc<dyn DurableGrant>) -> (Arc<TimerCoordinator>, Arc<RecordingAlerts>) {
        let alerts = Arc::new(RecordingAlerts::default());
        let coordinator = TimerCoordinator::spawn(grant, alerts.clone(), CoordinatorConfig::default());
        (coordinator, alerts)
    }

    fn coordinator() -> (Arc<TimerCoordinator>, Arc<RecordingAlerts>) {
        coordinator_with(Arc::new(ProcessGrant::new()))
    }

    async fn wait(millis: u64) {
        sleep(Duration::from_millis(millis)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn start_runs_both_engines() {
        let (coordinator, _) = coordinator();
        let status = coordinator
            .start_timer(60, Some("Rice".to_string()))
            .await
            .unwrap();

        assert_eq!(status.phase, CoordinatorPhase::Active);
        assert!(status.grant_held);
        assert!(!status.degraded);
        assert_eq!(status.timer.label.as_deref(), Some("Rice"));

        wait(2_500).await;
        assert_eq!(coordinator.durable_state().remaining_seconds, 58);
        assert_eq!(coordinator.local_state().await.unwrap().remaining_seconds, 58);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_duration_changes_nothing() {
        let (coordinator, _) = coordinator();
        let result = coordinator.start_timer(0, None).await;
        assert_eq!(result, Err(TimerError::InvalidDuration(0)));
        assert_eq!(coordinator.status().phase, CoordinatorPhase::NoTimer);
        assert_eq!(coordinator.durable_state(), TimerState::idle());
    }

    #[tokio::test(start_paused = true)]
    async fn finishing_enters_alarm_exactly_once() {
        let (coordinator, alerts) = coordinator();
        coordinator.start_timer(5, Some("eggs".to_string())).await.unwrap();

        wait(5_500).await;
        let status = coordinator.status();
        assert_eq!(status.phase, CoordinatorPhase::Alarming);
        assert_eq!(status.alarms_entered, 1);
        assert_eq!(status.timer.phase, TimerPhase::Finished);
        assert_eq!(status.timer.remaining_seconds, 0);
        assert_eq!(coordinator.local_state().await.unwrap().phase, TimerPhase::Finished);
        assert!(alerts.primary.load(Ordering::SeqCst) >= 1);

        wait(10_000).await;
        assert_eq!(coordinator.status().alarms_entered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledging_the_alarm_clears_everything() {
        let grant = Arc::new(ProcessGrant::new());
        let (coordinator, alerts) = coordinator_with(grant.clone());
        coordinator.start_timer(2, None).await.unwrap();
        wait(3_000).await;
        assert!(coordinator.status().is_alarming());

        let status = coordinator.acknowledge_alarm().await.unwrap();
        assert_eq!(status.phase, CoordinatorPhase::NoTimer);
        assert_eq!(status.timer, TimerState::idle());
        assert!(!grant.is_held());

        let rung = alerts.primary.load(Ordering::SeqCst);
        wait(5_000).await;
        assert_eq!(alerts.primary.load(Ordering::SeqCst), rung);
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledge_without_alarm_is_noop() {
        let (coordinator, _) = coordinator();
        coordinator.start_timer(30, None).await.unwrap();
        let status = coordinator.acknowledge_alarm().await.unwrap();
        assert_eq!(status.phase, CoordinatorPhase::Active);
        assert_eq!(coordinator.durable_state().phase, TimerPhase::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn large_drift_resyncs_local_engine() {
        let (coordinator, _) = coordinator();
        coordinator.start_timer(50, None).await.unwrap();

        let synced = coordinator.reconcile(46).await.unwrap();
        assert_eq!(synced.map(|s| s.remaining_seconds), Some(46));
        assert_eq!(coordinator.local_state().await.unwrap().remaining_seconds, 46);
    }

    #[tokio::test(start_paused = true)]
    async fn small_drift_is_tolerated() {
        let (coordinator, _) = coordinator();
        coordinator.start_timer(50, None).await.unwrap();

        assert_eq!(coordinator.reconcile(49).await.unwrap(), None);
        assert_eq!(coordinator.local_state().await.unwrap().remaining_seconds, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_zero_finishes_local_engine() {
        let (coordinator, _) = coordinator();
        coordinator.start_timer(50, None).await.unwrap();

        let state = coordinator.reconcile(0).await.unwrap().unwrap();
        assert_eq!(state.phase, TimerPhase::Finished);
        assert_eq!(state.remaining_seconds, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_apply_to_both_engines() {
        let (coordinator, _) = coordinator();
        coordinator.start_timer(10, None).await.unwrap();
        wait(3_500).await;

        let status = coordinator.pause_timer().await.unwrap();
        assert_eq!(status.timer.phase, TimerPhase::Paused);
        assert_eq!(status.timer.remaining_seconds, 7);
        assert_eq!(coordinator.local_state().await.unwrap().phase, TimerPhase::Paused);

        wait(5_000).await;
        let status = coordinator.resume_timer().await.unwrap();
        assert_eq!(status.timer.remaining_seconds, 7);
        assert_eq!(status.timer.phase, TimerPhase::Running);

        wait(1_500).await;
        assert_eq!(coordinator.durable_state().remaining_seconds, 6);
        assert_eq!(coordinator.local_state().await.unwrap().remaining_seconds, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn second_start_replaces_the_first_timer() {
        let (coordinator, _) = coordinator();
        coordinator.start_timer(10, Some("first".to_string())).await.unwrap();
        wait(1_500).await;
        coordinator.start_timer(20, Some("second".to_string())).await.unwrap();
        wait(2_500).await;

        let durable = coordinator.durable_state();
        assert_eq!(durable.total_duration_seconds, 20);
        assert_eq!(durable.remaining_seconds, 18);
        assert_eq!(durable.label.as_deref(), Some("second"));
        assert_eq!(coordinator.local_state().await.unwrap(), durable);
    }

    #[tokio::test(start_paused = true)]
    async fn denied_grant_runs_local_only_with_warning() {
        let (coordinator, _) = coordinator_with(Arc::new(DeniedGrant));
        let status = coordinator.start_timer(3, None).await.unwrap();

        assert!(status.degraded);
        assert!(!status.grant_held);
        assert_eq!(status.warnings.len(), 1);
        assert_eq!(status.timer.phase, TimerPhase::Running);
        assert_eq!(coordinator.durable_state(), TimerState::idle());

        wait(3_500).await;
        let status = coordinator.status();
        assert_eq!(status.phase, CoordinatorPhase::Alarming);
        assert_eq!(status.alarms_entered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn warnings_can_be_dismissed() {
        let (coordinator, _) = coordinator_with(Arc::new(DeniedGrant));
        coordinator.start_timer(30, None).await.unwrap();
        assert!(!coordinator.status().warnings.is_empty());
        assert!(coordinator.dismiss_warnings().warnings.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reattached_ui_picks_up_durable_time() {
        let (coordinator, _) = coordinator();
        coordinator.start_timer(60, None).await.unwrap();

        let status = coordinator.detach_ui().await;
        assert!(!status.ui_attached);
        assert!(coordinator.local_state().await.is_none());

        wait(10_500).await;
        assert_eq!(coordinator.durable_state().remaining_seconds, 50);

        let status = coordinator.attach_ui().await.unwrap();
        assert!(status.ui_attached);
        let local = coordinator.local_state().await.unwrap();
        assert_eq!(local.remaining_seconds, 50);
        assert_eq!(local.phase, TimerPhase::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn display_stream_follows_the_local_engine() {
        let (coordinator, _) = coordinator();
        let mut display = coordinator.subscribe_display();
        coordinator.start_timer(3, None).await.unwrap();

        let mut seen = Vec::new();
        loop {
            let state = display.recv().await.unwrap();
            seen.push(state.remaining_seconds);
            if state.is_finished() {
                break;
            }
        }
        assert_eq!(seen, vec![3, 2, 1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn authoritative_stream_carries_durable_snapshots() {
        let (coordinator, _) = coordinator();
        let mut events = coordinator.subscribe_authoritative();
        coordinator.start_timer(2, None).await.unwrap();

        let first = events.recv().await.unwrap();
        assert_eq!(first.state, TimerState::running(2, None));
        let second = events.recv().await.unwrap();
        assert_eq!(second.state.remaining_seconds, 1);
        assert_eq!(second.generation, first.generation);
    }

    #[tokio::test(start_paused = true)]
    async fn restoring_a_finished_timer_rings() {
        let (coordinator, _) = coordinator();
        let finished = TimerState {
            total_duration_seconds: 300,
            remaining_seconds: 0,
            label: Some("Bread".to_string()),
            phase: TimerPhase::Finished,
        };
        coordinator.restore_timer(finished).await.unwrap();

        wait(100).await;
        assert!(coordinator.status().is_alarming());
    }

    #[tokio::test(start_paused = true)]
    async fn lost_grant_hands_the_timer_to_the_local_engine() {
        let grant = Arc::new(RevocableGrant::default());
        let (coordinator, _) = coordinator_with(grant.clone());
        coordinator.start_timer(30, None).await.unwrap();
        wait(2_500).await;
        assert!(coordinator.status().grant_held);

        grant.lose(true);
        wait(1_000).await;
        let status = coordinator.status();
        assert!(status.degraded);
        assert!(!status.grant_held);
        assert_eq!(status.warnings.len(), 1);
        assert_eq!(status.timer.phase, TimerPhase::Running);
        assert_eq!(status.timer.remaining_seconds, 27);
        assert_eq!(coordinator.durable_state(), TimerState::idle());

        wait(27_000).await;
        let status = coordinator.status();
        assert!(status.is_alarming());
        assert_eq!(status.alarms_entered, 1);
        assert_eq!(status.warnings.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_grant_is_renewed() {
        let grant = Arc::new(RevocableGrant::default());
        let (coordinator, _) = coordinator_with(grant.clone());
        coordinator.start_timer(30, None).await.unwrap();

        grant.lose(false);
        wait(1_500).await;
        let status = coordinator.status();
        assert!(grant.is_held());
        assert!(status.grant_held);
        assert!(!status.degraded);
        assert!(status.warnings.is_empty());
        assert_eq!(coordinator.durable_state().remaining_seconds, 29);
    }

    #[tokio::test(start_paused = true)]
    async fn detaching_a_local_only_timer_loses_it() {
        let (coordinator, _) = coordinator_with(Arc::new(DeniedGrant));
        coordinator.start_timer(30, None).await.unwrap();

        let status = coordinator.detach_ui().await;
        assert!(!status.ui_attached);
        assert!(!status.degraded);
        assert_eq!(status.phase, CoordinatorPhase::NoTimer);
        assert_eq!(status.warnings.len(), 2);
        assert!(status.warnings.iter().any(|w| w.starts_with("Timer lost")));
    }

    #[tokio::test(start_paused = true)]
    async fn restoring_without_a_grant_runs_local_only() {
        let (coordinator, _) = coordinator_with(Arc::new(DeniedGrant));
        let mut saved = TimerState::running(120, Some("Stock".to_string()));
        saved.remaining_seconds = 90;

        let status = coordinator.restore_timer(saved).await.unwrap();
        assert!(status.degraded);
        assert_eq!(status.warnings.len(), 1);
        assert_eq!(status.timer.phase, TimerPhase::Running);
        assert_eq!(status.timer.remaining_seconds, 90);
        assert_eq!(coordinator.durable_state(), TimerState::idle());

        wait(1_500).await;
        assert_eq!(coordinator.local_state().await.unwrap().remaining_seconds, 89);
        assert_eq!(coordinator.status().timer.remaining_seconds, 89);
    }
}
