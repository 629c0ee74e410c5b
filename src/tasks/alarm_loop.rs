//! Alarm sub-loop: rings until acknowledged

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{error::TimerError, services::AlertSink};

/// Shortest time between two alarm cycles
const MIN_PERIOD: Duration = Duration::from_millis(100);

/// Timing of one alarm cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmCadence {
    /// Length of the primary tone
    pub tone: Duration,
    /// Silence after the tone before the next cycle
    pub pause: Duration,
    /// Length of the fallback sound when the tone fails
    pub fallback: Duration,
    /// Wait/vibrate lengths, starting with a wait
    pub vibration: Vec<Duration>,
}

impl AlarmCadence {
    /// Time between the starts of two cycles, never below `MIN_PERIOD`
    pub fn period(&self) -> Duration {
        (self.tone + self.pause).max(MIN_PERIOD)
    }
}

impl Default for AlarmCadence {
    fn default() -> Self {
        Self {
            tone: Duration::from_millis(300),
            pause: Duration::from_millis(1000),
            fallback: Duration::from_millis(1000),
            vibration: [0, 500, 200, 500, 200, 500]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
        }
    }
}

/// A running alarm. Dropping the handle also silences it.
#[derive(Debug)]
pub struct AlarmHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl AlarmHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Silence the alarm and wait for the loop to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!("Alarm task ended abnormally: {}", e);
        }
    }
}

/// Start ringing
pub fn spawn_alarm(alerts: Arc<dyn AlertSink>, cadence: AlarmCadence, label: Option<String>) -> AlarmHandle {
    let (shutdown, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(alarm_loop(alerts, cadence, label, shutdown_rx));
    AlarmHandle { shutdown, task }
}

/// Repeat the alert every cadence period until shut down.
///
/// A failed tone never ends the loop; the cycle falls back to the
/// notification sound and a vibration instead.
pub async fn alarm_loop(
    alerts: Arc<dyn AlertSink>,
    cadence: AlarmCadence,
    label: Option<String>,
    mut shutdown: oneshot::Receiver<()>,
) {
    info!("Alarm ringing for {}", label.as_deref().unwrap_or("timer"));

    if let Err(e) = alerts.vibrate(&cadence.vibration).await {
        debug!("Initial vibration unavailable: {}", e);
    }

    let mut ticker = interval(cadence.period());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut cycle: u64 = 0;

    loop {
        tokio::select! {
            biased;

            _ = &mut shutdown => break,

            _ = async {
                ticker.tick().await;
                cycle += 1;
                run_cycle(alerts.as_ref(), &cadence, cycle).await;
            } => {}
        }
    }

    info!("Alarm silenced after {} cycles", cycle);
}

/// One alarm cycle. A failed tone is followed by the fallback sound and a
/// vibration in the same cycle, so a silent host still buzzes every period
/// on top of the single vibration on entry.
async fn run_cycle(alerts: &dyn AlertSink, cadence: &AlarmCadence, cycle: u64) {
    let error = match alerts.play_alert(cadence.tone).await {
        Ok(()) => {
            debug!("Alarm cycle {}: tone played", cycle);
            return;
        }
        Err(e) => TimerError::from(e),
    };

    warn!("Alarm cycle {}: {}, using fallback", cycle, error);
    if let Err(e) = alerts.play_fallback(cadence.fallback).await {
        warn!("Alarm cycle {}: fallback sound failed: {}", cycle, e);
    }
    if let Err(e) = alerts.vibrate(&cadence.vibration).await {
        debug!("Alarm cycle {}: vibration unavailable: {}", cycle, e);
    }
}
