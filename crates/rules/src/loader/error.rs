//! Error types and load result structures for the rule loader.

use std::path::PathBuf;

use crate::condition::ConditionError;

/// Errors that can occur during rule loading and evaluation.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// Filesystem I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse/deserialization error.
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Rule validation error (e.g. empty detection block).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Condition could not be parsed, resolved or evaluated.
    #[error("Condition error: {0}")]
    Condition(#[from] ConditionError),
}

/// Result alias for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;

/// Outcome of loading a single rule file.
#[derive(Debug)]
pub struct LoadResult {
    /// Path to the file that was examined.
    pub path: PathBuf,
    /// Status of the load attempt.
    pub status: LoadStatus,
}

/// Status of a single file load attempt.
#[derive(Debug, PartialEq)]
pub enum LoadStatus {
    /// Rule was successfully loaded.
    Loaded { title: String },
    /// File was skipped (not YAML, empty, no detection block).
    Skipped { reason: String },
    /// Read or parse error occurred.
    Failed { error: String },
}

impl LoadStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadStatus::Loaded { .. })
    }
}
