//! Workflow error types and exit codes.

use std::path::PathBuf;

use serde::Serialize;

/// Errors raised while persisting workflow bookkeeping.
#[derive(thiserror::Error, Debug)]
pub enum WorkflowError {
    /// Recovery marker could not be read or written.
    #[error("Recovery marker {path}: {source}")]
    Recovery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Recovery marker held invalid JSON.
    #[error("Recovery marker is corrupt: {0}")]
    CorruptMarker(#[from] serde_json::Error),

    /// The output log path has no parent directory.
    #[error("Output log has no run directory: {0}")]
    NoRunDir(PathBuf),
}

/// How the daemon finished with a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowExit {
    #[default]
    Normal,
    /// Truncated or abandoned log, unusable exit code, or interrupted.
    Fatal,
    /// Engine process gone, or its log could not be read.
    EngineGone,
}

impl WorkflowExit {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Normal => 0,
            Self::Fatal => 1,
            Self::EngineGone => 42,
        }
    }
}
