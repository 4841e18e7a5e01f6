use thiserror::Error;

/// Failures reported by an [`EventSource`](crate::EventSource).
#[derive(Error, Debug)]
pub enum SourceError {
    /// The channel does not exist or cannot be opened. Retried next cycle.
    #[error("channel '{channel}' unavailable: {message}")]
    ChannelUnavailable { channel: String, message: String },

    #[error("reading channel '{channel}' failed: {message}")]
    Read { channel: String, message: String },
}

/// A record whose XML could not be normalized.
#[derive(Error, Debug)]
pub enum EventXmlError {
    #[error("malformed event XML: {0}")]
    Malformed(#[from] quick_xml::Error),

    #[error("event XML ended before the document was closed")]
    Truncated,

    #[error("event XML is missing System/{0}")]
    MissingField(&'static str),

    #[error("System/{field} is not a number: '{value}'")]
    InvalidNumber { field: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum CollectorError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("sink write failed: {0}")]
    Sink(#[from] std::io::Error),

    #[error("sink serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
