//! Byte-offset tail over the append-only sink file.
//!
//! The tailer never advances on its own: [`SinkTailer::read_new`] reports
//! where the next read should start and the caller decides when to
//! [`SinkTailer::commit`] it.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use aegis_core::config::DEFAULT_MAX_READ_BYTES;
use tracing::{debug, warn};

use crate::error::IngestError;

/// Complete lines read in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TailBatch {
    pub lines: Vec<String>,
    /// Offset just past the last complete line.
    pub next_offset: u64,
}

#[derive(Debug)]
pub struct SinkTailer {
    path: PathBuf,
    offset: u64,
    max_read: u64,
}

impl SinkTailer {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            max_read: DEFAULT_MAX_READ_BYTES,
        }
    }

    /// Cap the bytes taken per [`SinkTailer::read_new`] call. A backlog
    /// larger than the cap is drained over several cycles.
    pub fn with_max_read(mut self, bytes: u64) -> Self {
        self.max_read = bytes.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Skip everything already in the sink. A missing sink starts at 0.
    pub fn seek_to_end(&mut self) -> Result<u64, IngestError> {
        self.offset = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        Ok(self.offset)
    }

    pub fn commit(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// Read the complete lines written since the committed offset, at most
    /// `max_read` bytes of them.
    ///
    /// Returns `None` while the sink does not exist. A trailing line without
    /// its newline is left for a later call. A single line longer than the
    /// cap is skipped.
    pub fn read_new(&mut self) -> Result<Option<TailBatch>, IngestError> {
        let len = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "sink not created yet");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        if len < self.offset {
            warn!(
                path = %self.path.display(),
                offset = self.offset,
                len,
                "sink shrank below read offset, restarting from the beginning"
            );
            self.offset = 0;
        }
        if len == self.offset {
            return Ok(Some(TailBatch {
                lines: Vec::new(),
                next_offset: self.offset,
            }));
        }

        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.offset))?;
        let want = (len - self.offset).min(self.max_read);
        let mut buf = Vec::with_capacity(want as usize);
        file.take(want).read_to_end(&mut buf)?;

        let Some(last_newline) = buf.iter().rposition(|&b| b == b'\n') else {
            let mut next_offset = self.offset;
            if buf.len() as u64 >= self.max_read {
                warn!(
                    path = %self.path.display(),
                    offset = self.offset,
                    max_read = self.max_read,
                    "sink line exceeds read cap, skipping it"
                );
                next_offset += buf.len() as u64;
            }
            return Ok(Some(TailBatch {
                lines: Vec::new(),
                next_offset,
            }));
        };
        let complete = &buf[..=last_newline];
        let lines = String::from_utf8_lossy(complete)
            .lines()
            .map(str::to_string)
            .collect();

        Ok(Some(TailBatch {
            lines,
            next_offset: self.offset + complete.len() as u64,
        }))
    }
}
