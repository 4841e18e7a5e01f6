use std::collections::BTreeSet;

use aegis_core::config::CollectorConfig;
use aegis_core::{SinkRecord, Worker, WorkerError};
use tracing::{debug, error, info, warn};

use crate::error::{CollectorError, SourceError};
use crate::sink::SinkWriter;
use crate::source::EventSource;
use crate::watermark::Watermarks;
use crate::xml::parse_event_xml;

/// Polls each configured channel and appends new records to the sink.
pub struct EventLogCollector<S: EventSource> {
    source: S,
    channels: Vec<String>,
    include_event_ids: Option<BTreeSet<u32>>,
    sink: SinkWriter,
    watermarks: Watermarks,
    primed: BTreeSet<String>,
}

impl<S: EventSource> EventLogCollector<S> {
    pub fn new(source: S, config: &CollectorConfig) -> Self {
        Self {
            source,
            channels: config.channels.clone(),
            include_event_ids: config.include_event_ids.clone(),
            sink: SinkWriter::new(config.sink_path.clone()),
            watermarks: Watermarks::new(),
            primed: BTreeSet::new(),
        }
    }

    pub fn watermarks(&self) -> &Watermarks {
        &self.watermarks
    }

    fn allows(&self, event_id: u32) -> bool {
        self.include_event_ids
            .as_ref()
            .map(|ids| ids.contains(&event_id))
            .unwrap_or(true)
    }

    pub fn is_primed(&self, channel: &str) -> bool {
        self.primed.contains(channel)
    }

    /// Set each channel's watermark to its newest existing record so the
    /// backlog is never emitted.
    pub fn prime_watermarks(&mut self) {
        for channel in self.channels.clone() {
            self.prime_channel(&channel);
        }
    }

    /// A channel that cannot be read stays unprimed and is retried on the
    /// next cycle. Nothing is collected from it until priming succeeds.
    fn prime_channel(&mut self, channel: &str) -> bool {
        match self.source.latest_record_id(channel) {
            Ok(Some(latest)) => {
                self.watermarks.advance(channel, latest);
                info!(channel = %channel, watermark = latest, "channel primed");
            }
            Ok(None) => debug!(channel = %channel, "channel is empty"),
            Err(e) => {
                warn!(channel = %channel, error = %e, "could not prime channel, will retry");
                return false;
            }
        }
        self.primed.insert(channel.to_string());
        true
    }

    /// Process one channel. Returns the number of lines written.
    pub fn collect_channel(&mut self, channel: &str) -> Result<usize, CollectorError> {
        let watermark = self.watermarks.get(channel);
        let mut batch = self.source.read_newer(channel, watermark)?;
        batch.retain(|r| r.record_id > watermark);
        if batch.is_empty() {
            return Ok(0);
        }
        batch.sort_by_key(|r| r.record_id);

        let mut highest = watermark;
        let mut records = Vec::with_capacity(batch.len());
        for raw in &batch {
            highest = highest.max(raw.record_id);
            match parse_event_xml(&raw.xml, channel) {
                Ok(record) if self.allows(record.event_id) => {
                    records.push(SinkRecord::from(record))
                }
                Ok(record) => {
                    debug!(channel = %channel, event_id = record.event_id, "event filtered out")
                }
                Err(e) => warn!(
                    channel = %channel,
                    record_id = raw.record_id,
                    error = %e,
                    "skipping unreadable record"
                ),
            }
        }

        let written = self.sink.append(&records)?;
        self.watermarks.advance(channel, highest);
        debug!(
            channel = %channel,
            observed = batch.len(),
            written,
            watermark = highest,
            "channel collected"
        );
        Ok(written)
    }
}

impl<S: EventSource> Worker for EventLogCollector<S> {
    fn name(&self) -> &str {
        "event-log-collector"
    }

    fn start(&mut self) -> Result<(), WorkerError> {
        info!(
            channels = ?self.channels,
            sink = %self.sink.path().display(),
            filter = ?self.include_event_ids,
            "event log collector starting"
        );
        self.prime_watermarks();
        Ok(())
    }

    fn poll(&mut self) -> Result<(), WorkerError> {
        for channel in self.channels.clone() {
            if !self.is_primed(&channel) {
                self.prime_channel(&channel);
                continue;
            }
            match self.collect_channel(&channel) {
                Ok(_) => {}
                Err(CollectorError::Source(SourceError::ChannelUnavailable { message, .. })) => {
                    debug!(channel = %channel, reason = %message, "channel unavailable, skipping");
                }
                Err(e) => error!(channel = %channel, error = %e, "channel processing failed"),
            }
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), WorkerError> {
        for (channel, watermark) in self.watermarks.iter() {
            debug!(channel = %channel, watermark, "final watermark");
        }
        info!("event log collector stopped");
        Ok(())
    }
}
