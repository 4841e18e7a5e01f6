pub mod config;
pub mod error;
pub mod event;
pub mod matches;
pub mod worker;

pub use config::{Config, DeliveryMode};
pub use error::*;
pub use event::{SinkRecord, WinlogRecord};
pub use matches::MatchResult;
pub use worker::{Shutdown, Worker, WorkerBuilder, WorkerHandle, WorkerRunner};
