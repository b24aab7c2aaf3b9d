//! `SQLite`-backed sub-workflow registry.
//!
//! The tailing loop is single threaded, so the connection is used
//! synchronously and never shared.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use super::error::RegistryError;
use super::schema::SCHEMA;

/// Default registry file name inside the run (or output) directory.
pub const REGISTRY_FILE: &str = "monitord.subwf.db";

/// One registry row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub run_dir: PathBuf,
    pub retry: u32,
    pub dagman_out: Option<PathBuf>,
}

/// Durable mapping from a sub-workflow's run directory key to its retry
/// count and resolved output log.
#[derive(Debug)]
pub struct SubworkflowRegistry {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SubworkflowRegistry {
    /// Open (or create) the registry at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be applied.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).map_err(|source| RegistryError::Open {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = %path.display(), "Opened sub-workflow registry");
        Ok(Self {
            conn,
            path: Some(path),
        })
    }

    /// Open an in-memory registry.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema cannot be applied.
    pub fn open_in_memory() -> Result<Self, RegistryError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, path: None })
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Look up a run directory key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, run_dir: &Path) -> Result<Option<RegistryEntry>, RegistryError> {
        let key = run_dir.to_string_lossy();
        let row = self
            .conn
            .query_row(
                "SELECT retry, dagman_out FROM subworkflows WHERE run_dir = ?1",
                params![key],
                |row| Ok((row.get::<_, u32>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;
        Ok(row.map(|(retry, out)| RegistryEntry {
            run_dir: run_dir.to_path_buf(),
            retry,
            dagman_out: out.map(PathBuf::from),
        }))
    }

    /// Record a fresh discovery of `run_dir`: retry 0 the first time,
    /// incremented on every later discovery. Returns the retry to use.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn record_discovery(&mut self, run_dir: &Path) -> Result<u32, RegistryError> {
        let retry = match self.get(run_dir)? {
            Some(entry) => entry.retry + 1,
            None => 0,
        };
        self.store_retry(run_dir, retry)?;
        tracing::debug!(run_dir = %run_dir.display(), retry, "Sub-workflow discovered");
        Ok(retry)
    }

    /// Remember where a sub-workflow's output log was resolved to.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn set_output(&mut self, run_dir: &Path, dagman_out: &Path) -> Result<(), RegistryError> {
        self.conn.execute(
            "UPDATE subworkflows SET dagman_out = ?1, updated_at = ?2 WHERE run_dir = ?3",
            params![
                dagman_out.to_string_lossy(),
                chrono::Utc::now().to_rfc3339(),
                run_dir.to_string_lossy()
            ],
        )?;
        Ok(())
    }

    /// Number of registered sub-workflows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn len(&self) -> Result<usize, RegistryError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM subworkflows", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Flush and close the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` refuses to close.
    pub fn close(self) -> Result<(), RegistryError> {
        self.conn.close().map_err(|(_, e)| RegistryError::Query(e))
    }

    fn store_retry(&mut self, run_dir: &Path, retry: u32) -> Result<(), RegistryError> {
        self.conn.execute(
            "INSERT INTO subworkflows (run_dir, retry, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(run_dir) DO UPDATE SET retry = excluded.retry, updated_at = excluded.updated_at",
            params![
                run_dir.to_string_lossy(),
                retry,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

/// Move an existing registry file to the first free `<name>.NNN` slot.
///
/// Returns the new location, or `None` when there was nothing to move.
///
/// # Errors
///
/// Returns an error if the rename fails or all 1000 slots are taken.
pub fn rotate_file(path: &Path) -> Result<Option<PathBuf>, RegistryError> {
    if !path.exists() {
        return Ok(None);
    }
    for n in 0..1000 {
        let candidate = PathBuf::from(format!("{}.{n:03}", path.display()));
        if candidate.exists() {
            continue;
        }
        std::fs::rename(path, &candidate).map_err(|source| RegistryError::Rotate {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(from = %path.display(), to = %candidate.display(), "Rotated sub-workflow registry");
        return Ok(Some(candidate));
    }
    Err(RegistryError::RotationExhausted(path.to_path_buf()))
}
