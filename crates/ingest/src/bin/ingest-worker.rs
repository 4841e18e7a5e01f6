//! ingest-worker: runs the log tailer on its own.
//!
//! Useful on an analysis host that receives the sink file from elsewhere:
//! tails the sink, evaluates every new line against the loaded rules and
//! writes matches to the store. The collector is not started.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use aegis_core::config::{load_dotenv, Config};
use aegis_core::{Shutdown, WorkerBuilder, WorkerRunner};
use aegis_ingest::LogTailWorker;
use aegis_rules::{FieldResolver, RuleEngine};
use aegis_store::MatchStore;
use clap::Parser;
use tracing::{info, warn};

// ── CLI ──────────────────────────────────────────────────────────

/// Tail the event sink and persist rule matches.
#[derive(Parser, Debug)]
#[command(name = "ingest-worker", version, about)]
struct Cli {
    /// Sink file to tail (overrides AEGIS_SINK_PATH).
    #[arg(long)]
    sink: Option<PathBuf>,

    /// Match database (overrides AEGIS_DB_PATH).
    #[arg(long)]
    db: Option<PathBuf>,

    /// Rule directory; repeat for several (overrides AEGIS_RULE_DIRS).
    #[arg(long = "rules-dir")]
    rule_dirs: Vec<PathBuf>,

    /// Seconds between tail cycles (overrides AEGIS_TAILER_INTERVAL_SECS).
    #[arg(long)]
    interval: Option<u64>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(sink) = self.sink {
            config.tailer.sink_path = sink;
        }
        if let Some(db) = self.db {
            config.store.path = db;
        }
        if !self.rule_dirs.is_empty() {
            config.rules.dirs = self.rule_dirs;
        }
        if let Some(secs) = self.interval {
            config.tailer.poll_interval = Duration::from_secs(secs);
        }
    }
}

// ── main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();

    let mut config = Config::from_env();
    cli.apply(&mut config);
    config.log_summary();

    let store = Arc::new(MatchStore::open(&config.store.path)?);
    let resolver = FieldResolver::new(config.rules.commandline_image_fallback);
    let (engine, _) = RuleEngine::load(config.rules.dirs.clone(), resolver);

    let worker = LogTailWorker::new(&config.tailer, Arc::new(engine), store);
    let runner_config = WorkerBuilder::new("log-tailer")
        .poll_interval(config.tailer.poll_interval)
        .build();

    let shutdown = Shutdown::new();
    info!("ingest-worker starting");
    let handle = WorkerRunner::spawn(worker, runner_config, shutdown.subscribe());

    Shutdown::os_signal().await;
    info!("shutdown requested");
    shutdown.trigger();
    if handle.join(config.shutdown_timeout).await {
        info!("ingest-worker exited cleanly");
    } else {
        warn!(timeout = ?config.shutdown_timeout, "log tailer did not stop in time");
    }
    Ok(())
}
