//! Async driver for a `TimerMachine`
//!
//! Each `TimerEngine` spawns one actor task that exclusively owns its machine.
//! Commands and clock ticks are serialised through a single `select!` loop, so
//! a pause or stop is always applied before the next tick is processed.

use std::time::Duration;

use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, info};

use super::machine::{validate_duration, TimerMachine};
use crate::{
    error::TimerError,
    state::{TimerEvent, TimerPhase, TimerState},
};

const TICK_PERIOD: Duration = Duration::from_secs(1);
const EVENT_CAPACITY: usize = 128;

type Reply<T> = oneshot::Sender<T>;

#[derive(Debug)]
enum Command {
    Start {
        duration_seconds: i64,
        label: Option<String>,
        reply: Reply<Result<TimerEvent, TimerError>>,
    },
    Tick {
        generation: u64,
    },
    Pause {
        reply: Reply<TimerEvent>,
    },
    Resume {
        reply: Reply<TimerEvent>,
    },
    Stop {
        reply: Reply<TimerEvent>,
    },
    Resync {
        remaining_seconds: u64,
        reply: Reply<TimerEvent>,
    },
    ForceFinish {
        reply: Reply<TimerEvent>,
    },
    Restore {
        state: TimerState,
        reply: Reply<TimerEvent>,
    },
}

/// Handle to one running countdown engine
#[derive(Debug)]
pub struct TimerEngine {
    name: &'static str,
    command_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<TimerEvent>,
    event_tx: broadcast::Sender<TimerEvent>,
}

impl TimerEngine {
    /// Spawn a new idle engine. Must be called inside a tokio runtime.
    pub fn spawn(name: &'static str) -> Self {
        let machine = TimerMachine::new();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(machine.event());
        let (event_tx, _) = broadcast::channel(EVENT_CAPACITY);

        let actor = EngineActor {
            name,
            machine,
            command_rx,
            state_tx,
            event_tx: event_tx.clone(),
            ticker: None,
        };
        tokio::spawn(actor.run());

        Self {
            name,
            command_tx,
            state_rx,
            event_tx,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Start (or restart) a countdown. Non-positive durations are rejected
    /// before anything is sent to the engine.
    pub async fn start(&self, duration_seconds: i64, label: Option<String>) -> Result<TimerEvent, TimerError> {
        validate_duration(duration_seconds)?;
        self.request(|reply| Command::Start {
            duration_seconds,
            label,
            reply,
        })
        .await?
    }

    pub async fn pause(&self) -> Result<TimerEvent, TimerError> {
        self.request(|reply| Command::Pause { reply }).await
    }

    pub async fn resume(&self) -> Result<TimerEvent, TimerError> {
        self.request(|reply| Command::Resume { reply }).await
    }

    pub async fn stop(&self) -> Result<TimerEvent, TimerError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Restart the countdown from an authoritative remaining value
    pub async fn resync(&self, remaining_seconds: u64) -> Result<TimerEvent, TimerError> {
        self.request(|reply| Command::Resync {
            remaining_seconds,
            reply,
        })
        .await
    }

    pub async fn force_finish(&self) -> Result<TimerEvent, TimerError> {
        self.request(|reply| Command::ForceFinish { reply }).await
    }

    /// Replace the engine's state with a snapshot taken from another engine
    pub async fn restore(&self, state: TimerState) -> Result<TimerEvent, TimerError> {
        self.request(|reply| Command::Restore { state, reply }).await
    }

    /// Deliver a tick from an external clock. Fire-and-forget; ticks from
    /// another generation are discarded by the engine.
    pub fn tick(&self, generation: u64) -> Result<(), TimerError> {
        self.command_tx
            .send(Command::Tick { generation })
            .map_err(|_| TimerError::EngineClosed)
    }

    /// Latest snapshot. Never blocks.
    pub fn current_state(&self) -> TimerState {
        self.state_rx.borrow().state.clone()
    }

    pub fn current_event(&self) -> TimerEvent {
        self.state_rx.borrow().clone()
    }

    /// Every state change, in order
    pub fn subscribe(&self) -> broadcast::Receiver<TimerEvent> {
        self.event_tx.subscribe()
    }

    /// Latest-value view of the state
    pub fn watch(&self) -> watch::Receiver<TimerEvent> {
        self.state_rx.clone()
    }

    async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, TimerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(build(reply_tx))
            .map_err(|_| TimerError::EngineClosed)?;
        reply_rx.await.map_err(|_| TimerError::EngineClosed)
    }
}

struct EngineActor {
    name: &'static str,
    machine: TimerMachine,
    command_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<TimerEvent>,
    event_tx: broadcast::Sender<TimerEvent>,
    /// Present only while Running
    ticker: Option<Interval>,
}

impl EngineActor {
    async fn run(mut self) {
        debug!("{} engine started", self.name);

        loop {
            tokio::select! {
                biased;

                command = self.command_rx.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },

                _ = next_tick(&mut self.ticker) => {
                    let generation = self.machine.generation();
                    self.on_tick(generation);
                }
            }
        }

        debug!("{} engine shut down", self.name);
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Start {
                duration_seconds,
                label,
                reply,
            } => {
                let result = self.machine.start(duration_seconds, label);
                if let Ok(event) = &result {
                    // Drop the old ticker before the new countdown gets one
                    self.ticker = None;
                    info!(
                        "{} timer started: {}s{}",
                        self.name,
                        event.state.total_duration_seconds,
                        event.state.label.as_deref().map(|l| format!(" ({})", l)).unwrap_or_default()
                    );
                    self.publish(event.clone());
                }
                let _ = reply.send(result);
            }
            Command::Tick { generation } => self.on_tick(generation),
            Command::Pause { reply } => {
                if self.machine.pause().is_some() {
                    info!("{} timer paused at {}s", self.name, self.machine.state().remaining_seconds);
                }
                self.reply_with_change(None, reply);
            }
            Command::Resume { reply } => {
                if self.machine.resume().is_some() {
                    info!("{} timer resumed at {}s", self.name, self.machine.state().remaining_seconds);
                    self.ticker = None;
                }
                self.reply_with_change(None, reply);
            }
            Command::Stop { reply } => {
                self.ticker = None;
                let event = self.machine.stop();
                info!("{} timer stopped", self.name);
                self.reply_with_change(Some(event), reply);
            }
            Command::Resync {
                remaining_seconds,
                reply,
            } => {
                let previous = self.machine.state().remaining_seconds;
                if self.machine.resync(remaining_seconds).is_some() {
                    debug!("{} timer resynced: {}s -> {}s", self.name, previous, remaining_seconds);
                    self.ticker = None;
                }
                self.reply_with_change(None, reply);
            }
            Command::ForceFinish { reply } => {
                if self.machine.force_finish().is_some() {
                    info!("{} timer forced to finish", self.name);
                }
                self.reply_with_change(None, reply);
            }
            Command::Restore { state, reply } => {
                self.ticker = None;
                let event = self.machine.restore(state);
                debug!("{} timer restored: {} at {}s", self.name, event.state.phase, event.state.remaining_seconds);
                self.reply_with_change(Some(event), reply);
            }
        }
    }

    /// Publish the machine's state if it changed, then reply with it
    fn reply_with_change(&mut self, forced: Option<TimerEvent>, reply: Reply<TimerEvent>) {
        let current = self.machine.event();
        if forced.is_some() || *self.state_tx.borrow() != current {
            self.publish(current.clone());
        }
        let _ = reply.send(current);
    }

    fn on_tick(&mut self, generation: u64) {
        match self.machine.tick(generation) {
            Ok(Some(event)) => {
                debug!("{} timer: {}s remaining", self.name, event.state.remaining_seconds);
                if event.state.phase == TimerPhase::Finished {
                    info!("{} timer finished", self.name);
                }
                self.publish(event);
            }
            Ok(None) => {}
            Err(e) => debug!("{} engine discarding tick: {}", self.name, e),
        }
    }

    fn publish(&mut self, event: TimerEvent) {
        if event.state.phase == TimerPhase::Running {
            if self.ticker.is_none() {
                self.ticker = Some(one_second_ticker());
            }
        } else {
            self.ticker = None;
        }
        self.state_tx.send_replace(event.clone());
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}

fn one_second_ticker() -> Interval {
    let mut ticker = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use tokio::time::sleep;

    use super::*;

    async fn wait(millis: u64) {
        sleep(Duration::from_millis(millis)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn counts_down_once_per_second() {
        let engine = TimerEngine::spawn("test");
        engine.start(10, None).await.unwrap();
        wait(3_500).await;
        assert_eq!(engine.current_state().remaining_seconds, 7);
        assert_eq!(engine.current_state().phase, TimerPhase::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_invalid_duration_synchronously() {
        let engine = TimerEngine::spawn("test");
        assert_eq!(engine.start(0, None).await, Err(TimerError::InvalidDuration(0)));
        assert_eq!(engine.current_state(), TimerState::idle());
    }

    #[tokio::test(start_paused = true)]
    async fn events_are_ordered_and_end_in_finished() {
        let engine = TimerEngine::spawn("test");
        let mut events = engine.subscribe();
        engine.start(3, Some("eggs".to_string())).await.unwrap();

        let mut remaining = Vec::new();
        loop {
            let event = events.recv().await.unwrap();
            remaining.push(event.state.remaining_seconds);
            if event.state.is_finished() {
                break;
            }
        }
        assert_eq!(remaining, vec![3, 2, 1, 0]);
        assert_eq!(engine.current_state().label.as_deref(), Some("eggs"));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_remaining_time() {
        let engine = TimerEngine::spawn("test");
        engine.start(10, None).await.unwrap();
        wait(3_500).await;
        engine.pause().await.unwrap();
        assert_eq!(engine.current_state().remaining_seconds, 7);

        wait(5_000).await;
        let resumed = engine.resume().await.unwrap();
        assert_eq!(resumed.state.remaining_seconds, 7);
        assert_eq!(resumed.state.phase, TimerPhase::Running);

        wait(1_500).await;
        assert_eq!(engine.current_state().remaining_seconds, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_halts_the_tick_loop() {
        let engine = TimerEngine::spawn("test");
        engine.start(10, None).await.unwrap();
        wait(2_500).await;

        let mut events = engine.subscribe();
        engine.stop().await.unwrap();
        wait(5_000).await;

        assert_eq!(engine.current_state(), TimerState::idle());
        assert_eq!(events.recv().await.unwrap().state, TimerState::idle());
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_discards_the_first_countdown() {
        let engine = TimerEngine::spawn("test");
        engine.start(10, None).await.unwrap();
        wait(1_500).await;
        engine.start(20, None).await.unwrap();
        wait(2_500).await;

        let state = engine.current_state();
        assert_eq!(state.total_duration_seconds, 20);
        assert_eq!(state.remaining_seconds, 18);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_tick_from_old_generation_is_ignored() {
        let engine = TimerEngine::spawn("test");
        let old = engine.start(10, None).await.unwrap();
        engine.stop().await.unwrap();
        engine.start(20, None).await.unwrap();

        engine.tick(old.generation).unwrap();
        // Commands are applied in order, so the tick has been handled by now
        let paused = engine.pause().await.unwrap();
        assert_eq!(paused.state.remaining_seconds, 20);
        assert_eq!(paused.state.total_duration_seconds, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn external_tick_with_current_generation_counts() {
        let engine = TimerEngine::spawn("test");
        let started = engine.start(10, None).await.unwrap();
        engine.tick(started.generation).unwrap();
        let paused = engine.pause().await.unwrap();
        assert_eq!(paused.state.remaining_seconds, 9);
    }

    #[tokio::test(start_paused = true)]
    async fn resync_restarts_from_the_reported_value() {
        let engine = TimerEngine::spawn("test");
        engine.start(60, None).await.unwrap();
        let event = engine.resync(46).await.unwrap();
        assert_eq!(event.state.remaining_seconds, 46);
        wait(1_500).await;
        assert_eq!(engine.current_state().remaining_seconds, 45);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_closes_the_stream() {
        let engine = TimerEngine::spawn("test");
        let mut events = engine.subscribe();
        drop(engine);
        assert!(matches!(
            events.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
