//! Human-readable per-workflow job state log.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::types::{EventKind, MonitorEvent};

/// Default jobstate log name inside the run directory.
pub const JOBSTATE_FILE: &str = "jobstate.log";

/// Appends one line per workflow or job event.
#[derive(Debug)]
pub struct JobstateLog {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl JobstateLog {
    /// Open `path` for appending.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the line for `event`, if its kind has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn record(&mut self, event: &MonitorEvent) -> std::io::Result<()> {
        if let Some(line) = format_line(event) {
            writeln!(self.writer, "{line}")?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

fn format_line(event: &MonitorEvent) -> Option<String> {
    let ts = event.timestamp;
    match &event.kind {
        EventKind::WorkflowStarted => Some(format!(
            "{ts} INTERNAL *** DAGMAN_STARTED {} ***",
            event.restart_count.unwrap_or(0)
        )),
        EventKind::WorkflowEnded => Some(format!(
            "{ts} INTERNAL *** DAGMAN_FINISHED {} ***",
            event.status.unwrap_or(0)
        )),
        EventKind::Job(state) => Some(format!(
            "{ts} {} {} {} {} {} {}",
            event.job_id.as_deref().unwrap_or("-"),
            state,
            event.sched_id.as_deref().unwrap_or("-"),
            event.site.as_deref().unwrap_or("-"),
            event
                .walltime
                .map_or_else(|| "-".to_string(), |w| w.to_string()),
            event.submit_seq.unwrap_or(0),
        )),
        EventKind::JobRetry | EventKind::SubworkflowMapped => None,
    }
}
