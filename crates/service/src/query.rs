//! Read-only subcommands: stored matches and the rule load report.

use std::io::Write;
use std::path::Path;

use aegis_core::Config;
use aegis_rules::{LoadStatus, RuleLoader};
use aegis_store::{MatchQuery, MatchStore};
use anyhow::Context;

use crate::cli::MatchesArgs;

impl From<&MatchesArgs> for MatchQuery {
    fn from(args: &MatchesArgs) -> Self {
        MatchQuery {
            since_id: args.since_id,
            since: args.since,
            limit: Some(args.limit),
        }
    }
}

/// One JSON object per line, newest first. Returns the number printed.
pub fn write_matches<W: Write>(
    store: &MatchStore,
    query: &MatchQuery,
    out: &mut W,
) -> anyhow::Result<usize> {
    let matches = store.list_matches(query)?;
    for m in &matches {
        serde_json::to_writer(&mut *out, m)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(matches.len())
}

pub fn print_matches(config: &Config, args: &MatchesArgs) -> anyhow::Result<()> {
    let store = MatchStore::open(&config.store.path)
        .with_context(|| format!("failed to open match store at {}", config.store.path.display()))?;
    let stdout = std::io::stdout();
    write_matches(&store, &MatchQuery::from(args), &mut stdout.lock())?;
    Ok(())
}

/// Tab-separated `status  path  detail` per examined file. Returns the
/// number of loaded rules.
pub fn write_rule_report<W: Write>(
    dirs: &[impl AsRef<Path>],
    out: &mut W,
) -> anyhow::Result<usize> {
    let loader = RuleLoader::new(dirs.iter().map(|d| d.as_ref().to_path_buf()).collect());
    let (loaded, results) = loader.load_all();
    for result in &results {
        let (status, detail) = match &result.status {
            LoadStatus::Loaded { title } => ("loaded", title.as_str()),
            LoadStatus::Skipped { reason } => ("skipped", reason.as_str()),
            LoadStatus::Failed { error } => ("failed", error.as_str()),
        };
        writeln!(out, "{}\t{}\t{}", status, result.path.display(), detail)?;
    }
    out.flush()?;
    Ok(loaded.len())
}

pub fn print_rule_report(config: &Config) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let loaded = write_rule_report(&config.rules.dirs, &mut stdout.lock())?;
    tracing::info!(loaded, dirs = ?config.rules.dirs, "rule report complete");
    Ok(())
}
