//! Audible and haptic alert primitives used by the alarm loop

use std::{
    io::Cursor,
    path::Path,
    sync::Arc,
    time::Duration,
};

use futures::future::{self, BoxFuture, FutureExt};
use rodio::{Decoder, OutputStream, Sink, Source};
use tokio::{process::Command, task, time::timeout};
use tracing::debug;

use crate::error::AlertError;

/// Extra time an output device gets past the tone length before playback
/// counts as stalled
const PLAYBACK_GRACE: Duration = Duration::from_millis(500);

/// Host alert primitives.
///
/// Each call is one attempt; the alarm loop decides what to do on failure.
pub trait AlertSink: Send + Sync {
    /// Play the primary alarm tone for at most `duration`
    fn play_alert(&self, duration: Duration) -> BoxFuture<'_, Result<(), AlertError>>;

    /// Play the secondary alert (notification sound) for at most `duration`
    fn play_fallback(&self, duration: Duration) -> BoxFuture<'_, Result<(), AlertError>>;

    /// Run a vibration pattern: alternating wait/vibrate lengths
    fn vibrate<'a>(&'a self, pattern: &'a [Duration]) -> BoxFuture<'a, Result<(), AlertError>>;
}

/// An encoded sound held in memory, cheap to clone
#[derive(Debug, Clone)]
pub struct Sound(Arc<[u8]>);

impl AsRef<[u8]> for Sound {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Sound {
    /// Read and validate a sound file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AlertError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|source| AlertError::Load {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_bytes(bytes)
    }

    /// Wrap encoded bytes, failing if no decoder recognises them
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Result<Self, AlertError> {
        let sound = Sound(bytes.into());
        sound.decoder()?;
        Ok(sound)
    }

    fn decoder(&self) -> Result<Decoder<Cursor<Sound>>, AlertError> {
        Decoder::new(Cursor::new(self.clone())).map_err(|e| AlertError::Decode(e.to_string()))
    }
}

/// Alerts played in-process through the default audio output. Vibration is
/// delegated to an external command, when one is configured.
#[derive(Debug, Clone)]
pub struct SoundAlerts {
    tone: Option<Sound>,
    fallback: Option<Sound>,
    vibrate: Option<Vec<String>>,
}

impl SoundAlerts {
    pub fn new(tone: Option<Sound>, fallback: Option<Sound>, vibrate: Option<&str>) -> Self {
        Self {
            tone,
            fallback,
            vibrate: vibrate.map(split_command),
        }
    }
}

impl AlertSink for SoundAlerts {
    fn play_alert(&self, duration: Duration) -> BoxFuture<'_, Result<(), AlertError>> {
        match &self.tone {
            Some(sound) => play_bounded(sound.clone(), duration).boxed(),
            None => future::ready(Err(AlertError::Unsupported("alarm tone"))).boxed(),
        }
    }

    fn play_fallback(&self, duration: Duration) -> BoxFuture<'_, Result<(), AlertError>> {
        match &self.fallback {
            Some(sound) => play_bounded(sound.clone(), duration).boxed(),
            None => future::ready(Err(AlertError::Unsupported("fallback sound"))).boxed(),
        }
    }

    fn vibrate<'a>(&'a self, pattern: &'a [Duration]) -> BoxFuture<'a, Result<(), AlertError>> {
        async move {
            let Some(command) = &self.vibrate else {
                return Err(AlertError::Unsupported("vibration"));
            };
            let (program, args) = command.split_first().ok_or(AlertError::Unsupported("vibration"))?;
            let pattern = pattern
                .iter()
                .map(|d| d.as_millis().to_string())
                .collect::<Vec<_>>()
                .join(",");

            let output = Command::new(program)
                .args(args)
                .arg(&pattern)
                .output()
                .await
                .map_err(|source| AlertError::Io {
                    command: program.clone(),
                    source,
                })?;

            if !output.status.success() {
                return Err(AlertError::Failed {
                    command: program.clone(),
                    stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                });
            }
            Ok(())
        }
        .boxed()
    }
}

fn split_command(line: &str) -> Vec<String> {
    line.split_whitespace().map(str::to_string).collect()
}

async fn play_bounded(sound: Sound, duration: Duration) -> Result<(), AlertError> {
    within(duration + PLAYBACK_GRACE, move || play_blocking(&sound, duration)).await
}

/// Run blocking playback on the blocking pool. Playback still going at the
/// deadline is a failure.
async fn within<F>(deadline: Duration, play: F) -> Result<(), AlertError>
where
    F: FnOnce() -> Result<(), AlertError> + Send + 'static,
{
    match timeout(deadline, task::spawn_blocking(play)).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => Err(AlertError::Device(format!("playback thread failed: {}", e))),
        Err(_) => Err(AlertError::Stalled(deadline)),
    }
}

fn play_blocking(sound: &Sound, duration: Duration) -> Result<(), AlertError> {
    let source = sound.decoder()?.take_duration(duration);
    // The stream stops playing when dropped
    let (_stream, handle) = OutputStream::try_default().map_err(|e| AlertError::Device(e.to_string()))?;
    let sink = Sink::try_new(&handle).map_err(|e| AlertError::Device(e.to_string()))?;
    sink.append(source);
    sink.sleep_until_end();
    debug!("Played {}ms of alert sound", duration.as_millis());
    Ok(())
}
