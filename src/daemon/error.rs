//! Daemon-fatal error types.

use std::path::PathBuf;

use crate::config::ConfigError;
use crate::events::SinkError;
use crate::registry::RegistryError;

/// Conditions that stop the daemon before or outside the tailing loop.
#[derive(thiserror::Error, Debug)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Another daemon holds the pid file.
    #[error("Another monitor (pid {pid}) is running for {path}")]
    AlreadyRunning { pid: i32, path: PathBuf },

    /// Directory for the daemon's own files could not be created.
    #[error("Cannot create {path}: {source}")]
    DaemonDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Pid file could not be written.
    #[error("Cannot write pid file {path}: {source}")]
    PidFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Log file could not be opened.
    #[error("Cannot open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Signal handlers could not be installed.
    #[error("Cannot install signal handlers: {0}")]
    Signals(#[source] std::io::Error),

    /// A built-in pattern failed to compile.
    #[error("Invalid built-in pattern: {0}")]
    Pattern(#[from] regex::Error),
}

impl DaemonError {
    /// Process exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AlreadyRunning { .. } => 43,
            _ => 1,
        }
    }
}
