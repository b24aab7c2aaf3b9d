//! Registry error types.

use std::path::PathBuf;

/// Errors raised by the sub-workflow registry.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    /// Failed to open or create the database.
    #[error("Failed to open registry at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Failed to execute SQL.
    #[error("Registry query failed: {0}")]
    Query(#[from] rusqlite::Error),

    /// Failed to move an old registry out of the way.
    #[error("Failed to rotate registry {path}: {source}")]
    Rotate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No free rotation suffix left.
    #[error("No free rotation slot for {0}")]
    RotationExhausted(PathBuf),
}
