pub mod error;
pub mod tailer;
pub mod worker;

pub use error::IngestError;
pub use tailer::{SinkTailer, TailBatch};
pub use worker::{CycleReport, LogTailWorker};
