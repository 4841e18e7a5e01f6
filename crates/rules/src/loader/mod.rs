//! Filesystem rule loader.
//!
//! Walks the configured rule directories recursively, in file-name order,
//! and parses every `*.yml` / `*.yaml` file into a [`SigmaRule`](crate::SigmaRule).
//! Bad files are reported per-file and never abort the scan.

mod core;
mod error;


pub use self::core::{LoadedRule, RuleLoader};
pub use self::error::{LoadResult, LoadStatus, Result, RuleError};
