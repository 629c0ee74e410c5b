//! Durable execution grant: keeps the host awake while a timer runs

use std::{
    process::Stdio,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, MutexGuard,
    },
    time::Duration,
};

use futures::future::{BoxFuture, FutureExt};
use tokio::{
    process::{Child, Command},
    time::sleep,
};
use tracing::{debug, info, warn};

use crate::error::GrantError;

/// Upper bound on how long one grant is held
pub const MAX_GRANT_HOLD: Duration = Duration::from_secs(10 * 60 * 60);

/// How long a freshly spawned inhibitor must survive to count as held
const SETTLE_TIME: Duration = Duration::from_millis(200);

/// Permission to keep running after the foreground goes away
pub trait DurableGrant: Send + Sync {
    /// Acquire (or renew) the grant
    fn acquire(&self) -> BoxFuture<'_, Result<(), GrantError>>;

    /// Release the grant. Releasing a grant that is not held is a no-op.
    fn release(&self) -> BoxFuture<'_, ()>;

    fn is_held(&self) -> bool;
}

/// Holds a `systemd-inhibit` child process that blocks sleep and idle
/// suspension for as long as it lives.
#[derive(Debug)]
pub struct SystemdInhibitGrant {
    max_hold: Duration,
    inhibitor: Mutex<Option<Child>>,
}

impl SystemdInhibitGrant {
    pub fn new() -> Self {
        Self::with_max_hold(MAX_GRANT_HOLD)
    }

    pub fn with_max_hold(max_hold: Duration) -> Self {
        Self {
            max_hold,
            inhibitor: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Child>> {
        self.inhibitor.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn spawn_inhibitor(&self) -> Result<Child, GrantError> {
        debug!("Spawning systemd-inhibit for {}s", self.max_hold.as_secs());

        let mut child = Command::new("systemd-inhibit")
            .args([
                "--what=sleep:idle",
                "--who=cooking-timer",
                "--why=Cooking timer running",
                "--mode=block",
                "sleep",
            ])
            .arg(self.max_hold.as_secs().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| GrantError::Spawn {
                command: "systemd-inhibit".to_string(),
                source,
            })?;

        // A denied inhibitor lock makes systemd-inhibit exit right away
        sleep(SETTLE_TIME).await;
        if let Ok(Some(status)) = child.try_wait() {
            return Err(GrantError::Exited(format!("systemd-inhibit ({})", status)));
        }

        Ok(child)
    }
}

impl Default for SystemdInhibitGrant {
    fn default() -> Self {
        Self::new()
    }
}

impl DurableGrant for SystemdInhibitGrant {
    fn acquire(&self) -> BoxFuture<'_, Result<(), GrantError>> {
        async move {
            if self.is_held() {
                debug!("Inhibitor lock already held");
                return Ok(());
            }

            let child = self.spawn_inhibitor().await?;
            *self.slot() = Some(child);
            info!("Inhibitor lock acquired");
            Ok(())
        }
        .boxed()
    }

    fn release(&self) -> BoxFuture<'_, ()> {
        async move {
            let child = self.slot().take();
            if let Some(mut child) = child {
                if let Err(e) = child.kill().await {
                    warn!("Failed to stop systemd-inhibit: {}", e);
                }
                info!("Inhibitor lock released");
            }
        }
        .boxed()
    }

    fn is_held(&self) -> bool {
        let mut slot = self.slot();
        match slot.as_mut() {
            Some(child) => match child.try_wait() {
                Ok(None) => true,
                _ => {
                    *slot = None;
                    false
                }
            },
            None => false,
        }
    }
}

/// The daemon process itself is the durable context; always granted
#[derive(Debug, Default)]
pub struct ProcessGrant {
    held: AtomicBool,
}

impl ProcessGrant {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DurableGrant for ProcessGrant {
    fn acquire(&self) -> BoxFuture<'_, Result<(), GrantError>> {
        self.held.store(true, Ordering::SeqCst);
        futures::future::ready(Ok(())).boxed()
    }

    fn release(&self) -> BoxFuture<'_, ()> {
        self.held.store(false, Ordering::SeqCst);
        futures::future::ready(()).boxed()
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}
