//! OS event log collector.
//!
//! Polls event log channels through an [`EventSource`], normalizes each
//! record's XML into a [`WinlogRecord`](aegis_core::WinlogRecord) and appends
//! one JSON line per record to the sink file. A per-channel watermark keeps
//! records from being emitted twice.

pub mod collector;
pub mod error;
pub mod sink;
pub mod source;
pub mod watermark;
pub mod xml;

#[cfg(windows)]
pub mod wevt;

pub use collector::EventLogCollector;
pub use error::{CollectorError, EventXmlError, SourceError};
pub use sink::SinkWriter;
pub use source::{EventSource, SourceRecord};
pub use watermark::Watermarks;
pub use xml::{parse_event_xml, record_id_from_xml};

#[cfg(windows)]
pub use wevt::WevtSource;
