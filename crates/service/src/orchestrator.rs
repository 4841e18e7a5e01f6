//! Starts the collector and the tailer, waits for an OS signal, and joins
//! both loops with a bounded timeout.

use std::sync::Arc;
use std::time::Duration;

use aegis_core::{Config, Shutdown, WorkerBuilder, WorkerHandle, WorkerRunner};
use aegis_ingest::LogTailWorker;
use aegis_rules::{FieldResolver, RuleEngine};
use aegis_store::MatchStore;
use anyhow::Context;
use tracing::{info, warn};

/// The running loops and the channel that stops them.
pub struct Pipeline {
    shutdown: Shutdown,
    handles: Vec<WorkerHandle>,
}

impl Pipeline {
    /// Spawn every enabled loop on the current runtime.
    pub fn start(config: &Config, engine: Arc<RuleEngine>, store: Arc<MatchStore>) -> Self {
        let shutdown = Shutdown::new();
        let mut handles = Vec::new();

        if config.tailer.enabled {
            let worker = LogTailWorker::new(&config.tailer, engine, store);
            let runner = WorkerBuilder::new("log-tailer")
                .poll_interval(config.tailer.poll_interval)
                .build();
            handles.push(WorkerRunner::spawn(worker, runner, shutdown.subscribe()));
        } else {
            info!("log tailer disabled");
        }

        if config.collector.enabled {
            if let Some(handle) = spawn_collector(config, &shutdown) {
                handles.push(handle);
            }
        } else {
            info!("event log collector disabled");
        }

        Self { shutdown, handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Signal every loop and wait up to `timeout` for each one. Returns
    /// `true` when all of them finished in time.
    pub async fn stop(self, timeout: Duration) -> bool {
        self.shutdown.trigger();
        let mut clean = true;
        for handle in self.handles {
            clean &= handle.join(timeout).await;
        }
        clean
    }
}

#[cfg(windows)]
fn spawn_collector(config: &Config, shutdown: &Shutdown) -> Option<WorkerHandle> {
    use aegis_collector::{EventLogCollector, WevtSource};

    let worker = EventLogCollector::new(WevtSource::new(), &config.collector);
    let runner = WorkerBuilder::new("event-log-collector")
        .poll_interval(config.collector.poll_interval)
        .build();
    Some(WorkerRunner::spawn(worker, runner, shutdown.subscribe()))
}

#[cfg(not(windows))]
fn spawn_collector(_config: &Config, _shutdown: &Shutdown) -> Option<WorkerHandle> {
    warn!("the Windows event log is not available on this platform, collector not started");
    None
}

/// Run until SIGINT/SIGTERM. Only a store that cannot be opened is fatal.
pub async fn run(config: Config) -> anyhow::Result<()> {
    config.log_summary();

    let store = MatchStore::open(&config.store.path)
        .with_context(|| format!("failed to open match store at {}", config.store.path.display()))?;
    let resolver = FieldResolver::new(config.rules.commandline_image_fallback);
    let (engine, results) = RuleEngine::load(config.rules.dirs.clone(), resolver);
    let skipped = results.iter().filter(|r| !r.status.is_loaded()).count();
    if engine.is_empty() {
        warn!(dirs = ?config.rules.dirs, "no rules loaded, nothing will match");
    }
    info!(rules = engine.len(), skipped, "rules loaded");

    let pipeline = Pipeline::start(&config, Arc::new(engine), Arc::new(store));
    info!(loops = pipeline.len(), "aegis-service running");

    Shutdown::os_signal().await;
    info!("shutdown requested");

    if pipeline.stop(config.shutdown_timeout).await {
        info!("aegis-service exited cleanly");
    } else {
        warn!(timeout = ?config.shutdown_timeout, "some loops did not stop in time");
    }
    Ok(())
}
