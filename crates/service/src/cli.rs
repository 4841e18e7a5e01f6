//! Command-line surface. Flags override the environment-derived config.

use std::path::PathBuf;

use aegis_core::Config;
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "aegis-service", version, about = "Windows event log detection pipeline")]
pub struct Cli {
    /// Config profile; keys are looked up as {PROFILE}_{KEY} first.
    #[arg(long, global = true, env = "AEGIS_PROFILE", default_value = "")]
    pub profile: String,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the collector and the log tailer until interrupted (default).
    Run,
    /// Print stored matches as JSON lines, newest first.
    Matches(MatchesArgs),
    /// Load the rule directories and report every file's outcome.
    Rules,
}

#[derive(Args, Debug, Clone, PartialEq)]
pub struct MatchesArgs {
    /// Only matches with an id greater than this.
    #[arg(long)]
    pub since_id: Option<i64>,

    /// Only matches detected at or after this RFC 3339 instant.
    #[arg(long, value_parser = parse_since)]
    pub since: Option<DateTime<Utc>>,

    #[arg(long, default_value_t = 100)]
    pub limit: usize,
}

#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Sink file shared by the collector and the tailer.
    #[arg(long, global = true)]
    pub sink: Option<PathBuf>,

    /// Match database path.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Rule directory; repeat for several.
    #[arg(long = "rules-dir", global = true)]
    pub rule_dirs: Vec<PathBuf>,

    #[arg(long, global = true)]
    pub no_collector: bool,

    #[arg(long, global = true)]
    pub no_tailer: bool,
}

impl Overrides {
    pub fn apply(self, config: &mut Config) {
        if let Some(sink) = self.sink {
            config.collector.sink_path = sink.clone();
            config.tailer.sink_path = sink;
        }
        if let Some(db) = self.db {
            config.store.path = db;
        }
        if !self.rule_dirs.is_empty() {
            config.rules.dirs = self.rule_dirs;
        }
        if self.no_collector {
            config.collector.enabled = false;
        }
        if self.no_tailer {
            config.tailer.enabled = false;
        }
    }
}

fn parse_since(raw: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_run() {
        let cli = Cli::try_parse_from(["aegis-service"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn matches_filters_parse() {
        let cli = Cli::try_parse_from([
            "aegis-service",
            "matches",
            "--since-id",
            "41",
            "--since",
            "2024-05-01T12:00:00+02:00",
            "--limit",
            "5",
        ])
        .unwrap();
        let Some(Command::Matches(args)) = cli.command else {
            panic!("expected matches subcommand");
        };
        assert_eq!(args.since_id, Some(41));
        assert_eq!(args.since.unwrap().to_rfc3339(), "2024-05-01T10:00:00+00:00");
        assert_eq!(args.limit, 5);
    }

    #[test]
    fn bad_since_is_rejected() {
        assert!(Cli::try_parse_from(["aegis-service", "matches", "--since", "yesterday"]).is_err());
    }

    #[test]
    fn overrides_replace_config_values() {
        let cli = Cli::try_parse_from([
            "aegis-service",
            "run",
            "--sink",
            "/tmp/sink.log",
            "--rules-dir",
            "a",
            "--rules-dir",
            "b",
            "--no-collector",
        ])
        .unwrap();

        let mut config = Config::for_profile("AEGIS_CLI_TEST");
        cli.overrides.apply(&mut config);
        assert_eq!(config.collector.sink_path, PathBuf::from("/tmp/sink.log"));
        assert_eq!(config.tailer.sink_path, PathBuf::from("/tmp/sink.log"));
        assert_eq!(config.rules.dirs, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert!(!config.collector.enabled);
    }
}
