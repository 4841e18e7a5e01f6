use thiserror::Error;

/// Failure of a single worker lifecycle step (start, poll cycle, stop).
///
/// Workers wrap their crate-specific errors into this type so the runner can
/// log them uniformly; a failed poll cycle never terminates the loop.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("{worker} failed: {message}")]
    Failed { worker: String, message: String },

    #[error("{worker} panicked: {message}")]
    Panicked { worker: String, message: String },
}

impl WorkerError {
    pub fn failed(worker: impl Into<String>, err: impl std::fmt::Display) -> Self {
        WorkerError::Failed {
            worker: worker.into(),
            message: err.to_string(),
        }
    }
}

/// A configuration value that could not be interpreted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}, expected {expected}")]
    InvalidValue {
        key: String,
        value: String,
        expected: String,
    },
}
