//! Tracing setup with a runtime-adjustable level.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use super::error::DaemonError;

/// Levels walked by USR1 (up) and USR2 (down).
pub const LEVEL_LADDER: [LevelFilter; 4] = [
    LevelFilter::ERROR,
    LevelFilter::WARN,
    LevelFilter::INFO,
    LevelFilter::DEBUG,
];

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Current position on [`LEVEL_LADDER`] plus the handle that applies it.
pub struct LogLevelControl {
    handle: Option<FilterHandle>,
    index: AtomicUsize,
}

impl std::fmt::Debug for LogLevelControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogLevelControl")
            .field("level", &self.current())
            .field("attached", &self.handle.is_some())
            .finish()
    }
}

impl LogLevelControl {
    fn with_handle(handle: Option<FilterHandle>, initial: LevelFilter) -> Self {
        let index = LEVEL_LADDER
            .iter()
            .position(|l| *l == initial)
            .unwrap_or(1);
        Self {
            handle,
            index: AtomicUsize::new(index),
        }
    }

    /// A control not wired to any subscriber.
    #[must_use]
    pub fn detached(initial: LevelFilter) -> Self {
        Self::with_handle(None, initial)
    }

    #[must_use]
    pub fn current(&self) -> LevelFilter {
        LEVEL_LADDER[self.index.load(Ordering::SeqCst)]
    }

    /// Move `steps` rungs along the ladder, clamped at both ends.
    pub fn adjust(&self, steps: i32) -> LevelFilter {
        if steps == 0 {
            return self.current();
        }
        let top = LEVEL_LADDER.len() - 1;
        let current = self.index.load(Ordering::SeqCst);
        let magnitude = usize::try_from(steps.unsigned_abs()).unwrap_or(top);
        let next = if steps > 0 {
            current.saturating_add(magnitude).min(top)
        } else {
            current.saturating_sub(magnitude)
        };
        self.index.store(next, Ordering::SeqCst);

        let level = LEVEL_LADDER[next];
        if let Some(handle) = &self.handle {
            if let Err(e) = handle.reload(EnvFilter::new(level.to_string())) {
                tracing::warn!(error = %e, "Unable to change log level");
            }
        }
        tracing::warn!(level = %level, "Log level changed");
        level
    }
}

/// Level selected by the `-v` count.
#[must_use]
pub fn initial_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the `-v` count for the starting filter. Output goes
/// to stderr, or appends to `log_file` without colors.
///
/// # Errors
///
/// Returns an error if the log file cannot be opened.
pub fn init_tracing(verbosity: u8, log_file: Option<&Path>) -> Result<LogLevelControl, DaemonError> {
    let level = initial_level(verbosity);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let (filter, handle) = reload::Layer::new(filter);

    let (writer, ansi) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| DaemonError::LogFile {
                    path: path.to_path_buf(),
                    source,
                })?;
            (BoxMakeWriter::new(std::sync::Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(ansi))
        .init();

    Ok(LogLevelControl::with_handle(Some(handle), level))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_level_from_count() {
        assert_eq!(initial_level(0), LevelFilter::WARN);
        assert_eq!(initial_level(1), LevelFilter::INFO);
        assert_eq!(initial_level(5), LevelFilter::DEBUG);
    }

    #[test]
    fn test_adjust_clamps() {
        let control = LogLevelControl::detached(LevelFilter::INFO);
        assert_eq!(control.adjust(1), LevelFilter::DEBUG);
        assert_eq!(control.adjust(3), LevelFilter::DEBUG);
        assert_eq!(control.adjust(-2), LevelFilter::WARN);
        assert_eq!(control.adjust(-10), LevelFilter::ERROR);
        assert_eq!(control.adjust(0), LevelFilter::ERROR);
    }
}
