use crate::error::SourceError;

/// A raw record as read from a channel: its id plus the rendered event XML.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    pub record_id: u64,
    pub xml: String,
}

/// Access to OS event log channels.
///
/// Implementations read newest-first and may stop as soon as they reach a
/// record at or below the watermark; the collector filters again regardless.
pub trait EventSource: Send + 'static {
    /// Highest record id currently in `channel`, or `None` if it is empty.
    fn latest_record_id(&mut self, channel: &str) -> Result<Option<u64>, SourceError>;

    /// Records with an id above `watermark`, newest first.
    fn read_newer(
        &mut self,
        channel: &str,
        watermark: u64,
    ) -> Result<Vec<SourceRecord>, SourceError>;
}
