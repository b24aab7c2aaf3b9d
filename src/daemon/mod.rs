//! Process-level concerns: locking, signals, logging.

mod context;
mod error;
mod logging;
mod pidfile;
mod probe;
pub mod signals;

pub use context::DaemonContext;
pub use error::DaemonError;
pub use logging::{init_tracing, initial_level, LogLevelControl, LEVEL_LADDER};
pub use pidfile::{PidFile, PID_FILE};
pub use probe::{default_probe, AssumeAlive, ProcessProbe};
#[cfg(unix)]
pub use probe::NixProbe;
pub use signals::SignalFlags;
