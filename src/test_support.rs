//! In-memory host fakes for unit tests

use std::{
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
    time::Duration,
};

use futures::future::{self, BoxFuture, FutureExt};

use crate::{
    error::{AlertError, GrantError},
    services::{AlertSink, DurableGrant},
};

/// Counts alert attempts; the primary tone can be made to fail
#[derive(Debug, Default)]
pub struct RecordingAlerts {
    pub fail_primary: AtomicBool,
    pub primary: AtomicUsize,
    pub fallback: AtomicUsize,
    pub vibrations: AtomicUsize,
}

impl RecordingAlerts {
    pub fn failing() -> Self {
        let alerts = Self::default();
        alerts.fail_primary.store(true, Ordering::SeqCst);
        alerts
    }
}

impl AlertSink for RecordingAlerts {
    fn play_alert(&self, _duration: Duration) -> BoxFuture<'_, Result<(), AlertError>> {
        self.primary.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail_primary.load(Ordering::SeqCst) {
            Err(AlertError::Failed {
                command: "tone".to_string(),
                stderr: "device busy".to_string(),
            })
        } else {
            Ok(())
        };
        future::ready(result).boxed()
    }

    fn play_fallback(&self, _duration: Duration) -> BoxFuture<'_, Result<(), AlertError>> {
        self.fallback.fetch_add(1, Ordering::SeqCst);
        future::ready(Ok(())).boxed()
    }

    fn vibrate<'a>(&'a self, _pattern: &'a [Duration]) -> BoxFuture<'a, Result<(), AlertError>> {
        self.vibrations.fetch_add(1, Ordering::SeqCst);
        future::ready(Ok(())).boxed()
    }
}

/// A grant the host always refuses
#[derive(Debug, Default)]
pub struct DeniedGrant;

impl DurableGrant for DeniedGrant {
    fn acquire(&self) -> BoxFuture<'_, Result<(), GrantError>> {
        future::ready(Err(GrantError::Exited("background execution denied".to_string()))).boxed()
    }

    fn release(&self) -> BoxFuture<'_, ()> {
        future::ready(()).boxed()
    }

    fn is_held(&self) -> bool {
        false
    }
}

/// A grant that can be taken away from under the coordinator
#[derive(Debug, Default)]
pub struct RevocableGrant {
    held: AtomicBool,
    refuse: AtomicBool,
}

impl RevocableGrant {
    /// Drop the hold; with `refuse_renewal` every later acquire fails too
    pub fn lose(&self, refuse_renewal: bool) {
        self.refuse.store(refuse_renewal, Ordering::SeqCst);
        self.held.store(false, Ordering::SeqCst);
    }
}

impl DurableGrant for RevocableGrant {
    fn acquire(&self) -> BoxFuture<'_, Result<(), GrantError>> {
        let result = if self.refuse.load(Ordering::SeqCst) {
            Err(GrantError::Exited("systemd-inhibit".to_string()))
        } else {
            self.held.store(true, Ordering::SeqCst);
            Ok(())
        };
        future::ready(result).boxed()
    }

    fn release(&self) -> BoxFuture<'_, ()> {
        self.held.store(false, Ordering::SeqCst);
        future::ready(()).boxed()
    }

    fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}
