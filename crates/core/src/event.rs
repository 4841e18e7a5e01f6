use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One normalized OS event log record.
///
/// `record_id` is monotonic per channel and is what the collector's
/// watermark tracks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinlogRecord {
    pub channel: String,
    pub provider_name: String,
    pub event_id: u32,
    pub record_id: u64,
    /// Merged `EventData` and `UserData` values keyed by their local names.
    #[serde(default)]
    pub event_data: BTreeMap<String, String>,
}

/// A line of the sink file: `{"winlog": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkRecord {
    pub winlog: WinlogRecord,
}

impl SinkRecord {
    pub fn new(winlog: WinlogRecord) -> Self {
        Self { winlog }
    }

    /// Serialize as a single JSON line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<WinlogRecord> for SinkRecord {
    fn from(winlog: WinlogRecord) -> Self {
        Self::new(winlog)
    }
}
