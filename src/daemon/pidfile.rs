//! Single-instance lock per run directory.

use std::path::{Path, PathBuf};

use super::error::DaemonError;
use super::probe::ProcessProbe;

/// Pid file name inside the daemon directory.
pub const PID_FILE: &str = "monitord.pid";

/// Holds the pid file; removes it on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Write our pid to `path` unless a live daemon already owns it.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::AlreadyRunning`] if the recorded pid is alive
    /// and `force` is not set, or an error if the file cannot be written.
    pub fn acquire(
        path: impl AsRef<Path>,
        force: bool,
        probe: &dyn ProcessProbe,
    ) -> Result<Self, DaemonError> {
        let path = path.as_ref().to_path_buf();
        let own = i32::try_from(std::process::id()).unwrap_or(i32::MAX);

        if let Some(pid) = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| content.trim().parse::<i32>().ok())
        {
            if pid != own && probe.is_alive(pid) {
                if !force {
                    return Err(DaemonError::AlreadyRunning { pid, path });
                }
                tracing::warn!(pid, path = %path.display(), "Overriding pid file of a live monitor");
            }
        }

        std::fs::write(&path, format!("{own}\n")).map_err(|source| DaemonError::PidFile {
            path: path.clone(),
            source,
        })?;
        tracing::debug!(path = %path.display(), pid = own, "Wrote pid file");
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::debug!(path = %self.path.display(), error = %e, "Unable to remove pid file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixed(bool);

    impl ProcessProbe for Fixed {
        fn is_alive(&self, _pid: i32) -> bool {
            self.0
        }
    }

    #[test]
    fn test_acquire_writes_and_drop_removes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PID_FILE);
        {
            let lock = PidFile::acquire(&path, false, &Fixed(false)).unwrap();
            assert_eq!(lock.path(), path.as_path());
            let content = std::fs::read_to_string(&path).unwrap();
            assert_eq!(content.trim(), std::process::id().to_string());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_live_owner_blocks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PID_FILE);
        std::fs::write(&path, "1\n").unwrap();
        let err = PidFile::acquire(&path, false, &Fixed(true)).unwrap_err();
        assert_eq!(err.exit_code(), 43);
    }

    #[test]
    fn test_force_and_stale_owner() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PID_FILE);
        std::fs::write(&path, "1\n").unwrap();
        assert!(PidFile::acquire(&path, true, &Fixed(true)).is_ok());
        std::fs::write(&path, "1\n").unwrap();
        assert!(PidFile::acquire(&path, false, &Fixed(false)).is_ok());
    }
}
