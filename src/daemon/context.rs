//! Daemon-wide state handed to the tailing loop.

use std::sync::Arc;

use tracing_subscriber::filter::LevelFilter;

use super::logging::LogLevelControl;
use super::signals::SignalFlags;

/// Process-wide state the scheduler consults between cycles.
#[derive(Debug)]
pub struct DaemonContext {
    pub signals: Arc<SignalFlags>,
    pub log: LogLevelControl,
}

impl DaemonContext {
    #[must_use]
    pub fn new(log: LogLevelControl) -> Self {
        Self {
            signals: Arc::new(SignalFlags::new()),
            log,
        }
    }

    /// Context with no subscriber attached, for tests and embedding.
    #[must_use]
    pub fn detached() -> Self {
        Self::new(LogLevelControl::detached(LevelFilter::WARN))
    }

    /// Apply any verbosity change queued by USR1/USR2.
    pub fn apply_verbosity(&self) {
        let delta = self.signals.take_verbosity();
        if delta != 0 {
            self.log.adjust(delta);
        }
    }

    #[must_use]
    pub fn shutting_down(&self) -> bool {
        self.signals.terminate_requested()
    }
}
