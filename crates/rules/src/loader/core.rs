//! Core [`RuleLoader`] struct: filesystem-backed SIGMA rule discovery.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::schema::SigmaRule;

use super::error::{LoadResult, LoadStatus, Result, RuleError};

/// A parsed rule together with the file it came from.
#[derive(Debug, Clone)]
pub struct LoadedRule {
    pub path: PathBuf,
    pub rule: SigmaRule,
}

/// Filesystem-backed rule loader.
///
/// Scans each configured directory recursively for `*.yml` / `*.yaml` files,
/// hidden names included, and deserializes them into [`SigmaRule`]
/// instances. Directory walks are sorted by file name so discovery order is
/// stable across runs.
pub struct RuleLoader {
    dirs: Vec<PathBuf>,
}

fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("yml") || e.eq_ignore_ascii_case("yaml"))
        .unwrap_or(false)
}

impl RuleLoader {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self { dirs }
    }

    /// Scan every rule directory and parse all candidate files.
    ///
    /// Returns the accepted rules in discovery order plus one [`LoadResult`]
    /// per examined file. Missing directories, unreadable entries and bad
    /// files are logged and skipped.
    pub fn load_all(&self) -> (Vec<LoadedRule>, Vec<LoadResult>) {
        let mut rules = Vec::new();
        let mut results = Vec::new();

        for dir in &self.dirs {
            if !dir.is_dir() {
                warn!(path = %dir.display(), "rules directory does not exist, skipping");
                continue;
            }
            self.scan_dir(dir, &mut rules, &mut results);
        }

        info!(
            loaded = rules.len(),
            examined = results.len(),
            "rule loading complete"
        );
        (rules, results)
    }

    fn scan_dir(&self, dir: &Path, rules: &mut Vec<LoadedRule>, results: &mut Vec<LoadResult>) {
        let walker = WalkDir::new(dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    warn!(error = %e, "walkdir error, skipping entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.into_path();
            if !is_yaml(&path) {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML file".to_string(),
                    },
                });
                continue;
            }

            match self.load_file(&path) {
                Ok(rule) => {
                    debug!(
                        title = %rule.title,
                        level = %rule.level,
                        path = %path.display(),
                        "loaded rule"
                    );
                    results.push(LoadResult {
                        path: path.clone(),
                        status: LoadStatus::Loaded {
                            title: rule.title.clone(),
                        },
                    });
                    rules.push(LoadedRule { path, rule });
                }
                Err(RuleError::Validation(reason)) => {
                    debug!(path = %path.display(), reason = %reason, "skipping rule file");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Skipped { reason },
                    });
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load rule file");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }
    }

    /// Parse a single YAML file into a [`SigmaRule`].
    ///
    /// A file without a non-empty `detection` mapping is a validation error.
    pub fn load_file(&self, path: &Path) -> Result<SigmaRule> {
        let contents = fs::read_to_string(path)?;
        if contents.trim().is_empty() {
            return Err(RuleError::Validation("file is empty".to_string()));
        }

        let rule = SigmaRule::from_yaml(&contents)?;
        if rule.detection.is_empty() {
            return Err(RuleError::Validation("no detection block".to_string()));
        }

        Ok(rule)
    }
}
