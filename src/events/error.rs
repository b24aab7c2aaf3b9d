//! Event sink error types.

use std::path::PathBuf;

/// Errors raised while delivering events.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    /// Failed to open the destination.
    #[error("Failed to open event destination {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize an event.
    #[error("JSON serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// I/O error while writing.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A shared in-memory buffer was poisoned by a panicking holder.
    #[error("Event buffer poisoned")]
    Poisoned,
}
