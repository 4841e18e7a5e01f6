//! aegis-service: Windows event log detection pipeline.
//!
//! `run` (the default) starts the event log collector and the log tailer and
//! keeps them going until SIGINT/SIGTERM. `matches` and `rules` are
//! read-only helpers for operators and the UI.

mod cli;
mod orchestrator;
mod query;

use aegis_core::config::load_dotenv;
use aegis_core::Config;
use clap::Parser;

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so `matches` output stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let mut config = Config::for_profile(&cli.profile);
    cli.overrides.apply(&mut config);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => orchestrator::run(config).await,
        Command::Matches(args) => query::print_matches(&config, &args),
        Command::Rules => query::print_rule_report(&config),
    }
}
