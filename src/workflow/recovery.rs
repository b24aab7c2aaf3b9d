//! Last-processed-line marker persisted next to the run directory.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::WorkflowError;

/// Marker file name.
pub const RECOVERY_FILE: &str = "monitord.recover";

/// How far a previous daemon got through an output log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryMarker {
    pub last_processed_line: u64,
    pub byte_offset: u64,
    pub updated_at: DateTime<Utc>,
}

impl RecoveryMarker {
    #[must_use]
    pub fn new(last_processed_line: u64, byte_offset: u64) -> Self {
        Self {
            last_processed_line,
            byte_offset,
            updated_at: Utc::now(),
        }
    }

    /// Load the marker at `path`, `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Option<Self>, WorkflowError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(WorkflowError::Recovery {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Write the marker atomically (temp file, then rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), WorkflowError> {
        let io_err = |source| WorkflowError::Recovery {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let temp_path = path.with_extension("tmp");
        let content = serde_json::to_string(self)?;
        fs::write(&temp_path, content).map_err(io_err)?;
        fs::rename(&temp_path, path).map_err(io_err)?;
        Ok(())
    }

    /// Remove the marker; a missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove(path: &Path) -> Result<(), WorkflowError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(WorkflowError::Recovery {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_marker_loads_as_none() {
        let dir = TempDir::new().unwrap();
        assert_eq!(RecoveryMarker::load(&dir.path().join(RECOVERY_FILE)).unwrap(), None);
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(RECOVERY_FILE);
        let marker = RecoveryMarker::new(42, 4096);
        marker.save(&path).unwrap();
        assert!(!path.with_extension("tmp").exists());
        assert_eq!(RecoveryMarker::load(&path).unwrap(), Some(marker));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(RECOVERY_FILE);
        RecoveryMarker::new(1, 1).save(&path).unwrap();
        RecoveryMarker::remove(&path).unwrap();
        RecoveryMarker::remove(&path).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_corrupt_marker_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(RECOVERY_FILE);
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            RecoveryMarker::load(&path),
            Err(WorkflowError::CorruptMarker(_))
        ));
    }
}
