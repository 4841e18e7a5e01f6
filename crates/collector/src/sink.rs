use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use aegis_core::SinkRecord;

use crate::error::CollectorError;

/// Appends normalized records to the sink file, one JSON object per line.
#[derive(Debug, Clone)]
pub struct SinkWriter {
    path: PathBuf,
}

impl SinkWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `records` and flush. The file and its parent directories are
    /// created on first use. Returns the number of lines written.
    pub fn append(&self, records: &[SinkRecord]) -> Result<usize, CollectorError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut lines = String::new();
        for record in records {
            lines.push_str(&record.to_json_line()?);
            lines.push('\n');
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(lines.as_bytes())?;
        writer.flush()?;

        Ok(records.len())
    }
}
