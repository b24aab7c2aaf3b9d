//! Event sinks.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::error::SinkError;
use super::types::MonitorEvent;

/// Destination for normalized events.
pub trait EventSink: Send {
    /// Deliver one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event cannot be written.
    fn emit(&mut self, event: &MonitorEvent) -> Result<(), SinkError>;

    /// Make everything emitted so far durable.
    ///
    /// # Errors
    ///
    /// Returns an error if buffered events cannot be written out.
    fn flush(&mut self) -> Result<(), SinkError>;

    /// Flush and release the destination.
    ///
    /// # Errors
    ///
    /// Returns an error if the final flush fails.
    fn close(&mut self) -> Result<(), SinkError> {
        self.flush()
    }
}

/// Newline-delimited JSON, one event per line.
pub struct JsonLinesSink {
    writer: BufWriter<Box<dyn Write + Send>>,
    target: String,
}

impl std::fmt::Debug for JsonLinesSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesSink")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl JsonLinesSink {
    /// Open `dest` for appending; `-` writes to stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open(dest: &str) -> Result<Self, SinkError> {
        if dest == "-" {
            return Ok(Self::from_writer(Box::new(std::io::stdout()), "stdout"));
        }
        let path = PathBuf::from(dest);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| SinkError::Open {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path = %path.display(), "Writing events");
        Ok(Self::from_writer(Box::new(file), dest))
    }

    #[must_use]
    pub fn from_writer(writer: Box<dyn Write + Send>, target: &str) -> Self {
        Self {
            writer: BufWriter::new(writer),
            target: target.to_string(),
        }
    }
}

impl EventSink for JsonLinesSink {
    fn emit(&mut self, event: &MonitorEvent) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Collects events in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<MonitorEvent>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything emitted so far.
    #[must_use]
    pub fn events(&self) -> Vec<MonitorEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl EventSink for MemorySink {
    fn emit(&mut self, event: &MonitorEvent) -> Result<(), SinkError> {
        self.events
            .lock()
            .map_err(|_| SinkError::Poisoned)?
            .push(event.clone());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&mut self, _event: &MonitorEvent) -> Result<(), SinkError> {
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Default event file for an output log: `run/x.dag.dagman.out` becomes
/// `run/x.events.jsonl`.
#[must_use]
pub fn default_destination(dagman_out: &Path) -> PathBuf {
    let name = dagman_out
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name
        .strip_suffix(".dag.dagman.out")
        .or_else(|| name.strip_suffix(".dagman.out"))
        .unwrap_or(&name);
    dagman_out.with_file_name(format!("{stem}.events.jsonl"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use tempfile::TempDir;

    fn started() -> MonitorEvent {
        MonitorEvent::new("wf", "wf", EventKind::WorkflowStarted, 1)
    }

    #[test]
    fn test_json_lines_sink_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("events.jsonl");
        let dest = path.to_string_lossy().into_owned();
        {
            let mut sink = JsonLinesSink::open(&dest).unwrap();
            sink.emit(&started()).unwrap();
            sink.close().unwrap();
        }
        {
            let mut sink = JsonLinesSink::open(&dest).unwrap();
            sink.emit(&started()).unwrap();
            sink.close().unwrap();
        }
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: MonitorEvent = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.kind, EventKind::WorkflowStarted);
    }

    #[test]
    fn test_memory_sink_clones_share_buffer() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.emit(&started()).unwrap();
        assert_eq!(sink.events().len(), 1);
    }

    #[test]
    fn test_default_destination() {
        assert_eq!(
            default_destination(Path::new("/run/wf.dag.dagman.out")),
            PathBuf::from("/run/wf.events.jsonl")
        );
        assert_eq!(
            default_destination(Path::new("/run/other.dagman.out")),
            PathBuf::from("/run/other.events.jsonl")
        );
    }
}
