use std::sync::Arc;

use aegis_core::config::{DeliveryMode, TailerConfig};
use aegis_core::{Worker, WorkerError};
use aegis_rules::RuleEngine;
use aegis_store::MatchStore;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::error::IngestError;
use crate::tailer::SinkTailer;

/// Counters for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub lines: usize,
    pub malformed: usize,
    pub matches: usize,
}

/// Tails the sink, runs every new event through the rule engine and
/// persists the cycle's matches as one batch.
pub struct LogTailWorker {
    tailer: SinkTailer,
    engine: Arc<RuleEngine>,
    store: Arc<MatchStore>,
    delivery: DeliveryMode,
}

impl LogTailWorker {
    pub fn new(config: &TailerConfig, engine: Arc<RuleEngine>, store: Arc<MatchStore>) -> Self {
        Self {
            tailer: SinkTailer::new(config.sink_path.clone())
                .with_max_read(config.max_read_bytes),
            engine,
            store,
            delivery: config.delivery,
        }
    }

    pub fn tailer(&self) -> &SinkTailer {
        &self.tailer
    }

    /// One tail-detect-persist cycle.
    pub fn run_cycle(&mut self) -> Result<CycleReport, IngestError> {
        let mut report = CycleReport::default();
        let Some(batch) = self.tailer.read_new()? else {
            return Ok(report);
        };
        if batch.lines.is_empty() {
            self.tailer.commit(batch.next_offset);
            return Ok(report);
        }
        if self.delivery == DeliveryMode::AtMostOnce {
            self.tailer.commit(batch.next_offset);
        }

        let mut matches = Vec::new();
        for line in &batch.lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            report.lines += 1;
            match serde_json::from_str::<Value>(line) {
                Ok(event) => matches.extend(self.engine.detect(&event)),
                Err(e) => {
                    report.malformed += 1;
                    warn!(error = %e, line = %line, "skipping malformed sink line");
                }
            }
        }

        report.matches = self.store.insert_batch(&matches)?;
        self.tailer.commit(batch.next_offset);

        for m in &matches {
            info!(title = %m.rule_title, level = %m.rule_level, "rule matched");
        }
        Ok(report)
    }
}

impl Worker for LogTailWorker {
    fn name(&self) -> &str {
        "log-tailer"
    }

    fn start(&mut self) -> Result<(), WorkerError> {
        let offset = self
            .tailer
            .seek_to_end()
            .map_err(|e| WorkerError::failed("log-tailer", e))?;
        info!(
            sink = %self.tailer.path().display(),
            offset,
            rules = self.engine.len(),
            delivery = %self.delivery,
            "log tailer starting"
        );
        Ok(())
    }

    fn poll(&mut self) -> Result<(), WorkerError> {
        match self.run_cycle() {
            Ok(report) if report.lines > 0 => {
                debug!(
                    lines = report.lines,
                    malformed = report.malformed,
                    matches = report.matches,
                    offset = self.tailer.offset(),
                    "tail cycle complete"
                );
            }
            Ok(_) => {}
            Err(IngestError::Store(e)) => {
                let replay = self.delivery == DeliveryMode::AtLeastOnce;
                error!(error = %e, replay, "match batch rolled back");
            }
            Err(e) => return Err(WorkerError::failed(self.name(), e)),
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), WorkerError> {
        info!(offset = self.tailer.offset(), "log tailer stopped");
        Ok(())
    }
}
