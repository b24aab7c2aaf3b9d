//! Incremental output log reader.
//!
//! Reads bounded chunks from a growing text file and hands back complete
//! lines, keeping any unterminated tail for the next read.

use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::error::TailError;

/// Bounded, offset-tracking reader for one output log.
#[derive(Debug)]
pub struct LogTailer {
    path: PathBuf,
    file: Option<File>,
    /// Bytes consumed so far, including the buffered partial line.
    offset: u64,
    remainder: Vec<u8>,
    chunk: usize,
}

impl LogTailer {
    /// Create a tailer reading at most `chunk` bytes per call.
    #[must_use]
    pub fn new(path: PathBuf, chunk: usize) -> Self {
        Self {
            path,
            file: None,
            offset: 0,
            remainder: Vec::new(),
            chunk: chunk.max(1),
        }
    }

    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be stat'ed.
    pub async fn size(&self) -> Result<u64, TailError> {
        tokio::fs::metadata(&self.path)
            .await
            .map(|m| m.len())
            .map_err(|e| TailError::from_io(&self.path, e))
    }

    /// Read the next chunk and return the complete lines it finished,
    /// with trailing whitespace removed.
    ///
    /// Returns `None` when the read came back empty although the file grew;
    /// the offset is left where it was so the next call retries.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or read.
    pub async fn read_lines(&mut self) -> Result<Option<Vec<String>>, TailError> {
        let path = self.path.clone();
        let offset = self.offset;
        let chunk = self.chunk;

        if self.file.is_none() {
            let opened = File::open(&path)
                .await
                .map_err(|e| TailError::from_io(&path, e))?;
            self.file = Some(opened);
        }
        let Some(file) = self.file.as_mut() else {
            return Ok(None);
        };

        file.seek(std::io::SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; chunk];
        let read = file.read(&mut buf).await?;
        if read == 0 {
            tracing::debug!(path = %path.display(), offset, "Zero-length read, rewinding");
            return Ok(None);
        }
        buf.truncate(read);
        self.offset += read as u64;

        self.remainder.extend_from_slice(&buf);
        let Some(last_newline) = self.remainder.iter().rposition(|b| *b == b'\n') else {
            return Ok(Some(Vec::new()));
        };
        let tail = self.remainder.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.remainder, tail);

        // `complete` ends with the newline found above.
        let lines = complete[..complete.len() - 1]
            .split(|b| *b == b'\n')
            .map(|raw| String::from_utf8_lossy(raw).trim_end().to_string())
            .collect();
        Ok(Some(lines))
    }
}
