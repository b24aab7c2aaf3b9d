//! Signal-driven control flags.
//!
//! Handlers only flip flags and wake the scheduler; all work happens in the
//! main loop between cycles.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Flags shared between the signal task and the scheduler.
#[derive(Debug, Default)]
pub struct SignalFlags {
    terminate: AtomicBool,
    verbosity: AtomicI32,
    wake: Notify,
}

impl SignalFlags {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_terminate(&self) {
        self.terminate.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    #[must_use]
    pub fn terminate_requested(&self) -> bool {
        self.terminate.load(Ordering::SeqCst)
    }

    /// Queue a verbosity change of `delta` steps.
    pub fn bump_verbosity(&self, delta: i32) {
        self.verbosity.fetch_add(delta, Ordering::SeqCst);
        self.wake.notify_one();
    }

    /// Take the pending verbosity change, resetting it to zero.
    pub fn take_verbosity(&self) -> i32 {
        self.verbosity.swap(0, Ordering::SeqCst)
    }

    /// Wait until a handler fires. A wake-up sent while nobody waited is kept.
    pub async fn notified(&self) {
        self.wake.notified().await;
    }
}

/// Spawn the listener task for HUP, INT, TERM, USR1 and USR2.
///
/// # Errors
///
/// Returns an error if a handler cannot be registered.
#[cfg(unix)]
pub fn install(flags: Arc<SignalFlags>) -> std::io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hup = signal(SignalKind::hangup())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut term = signal(SignalKind::terminate())?;
    let mut usr1 = signal(SignalKind::user_defined1())?;
    let mut usr2 = signal(SignalKind::user_defined2())?;

    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = hup.recv() => tracing::info!("Ignoring SIGHUP"),
                _ = int.recv() => {
                    tracing::info!("SIGINT received, shutting down");
                    flags.request_terminate();
                }
                _ = term.recv() => {
                    tracing::info!("SIGTERM received, shutting down");
                    flags.request_terminate();
                }
                _ = usr1.recv() => flags.bump_verbosity(1),
                _ = usr2.recv() => flags.bump_verbosity(-1),
            }
        }
    }))
}

/// Spawn a Ctrl-C listener where Unix signals are unavailable.
///
/// # Errors
///
/// Never fails; the signature matches the Unix variant.
#[cfg(not(unix))]
pub fn install(flags: Arc<SignalFlags>) -> std::io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flags.request_terminate();
        }
    }))
}
