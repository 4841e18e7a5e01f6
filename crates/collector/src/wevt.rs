//! Windows Event Log source (`EvtQuery` + `EvtNext` + `EvtRender`).
//!
//! Channels are queried in reverse direction so the newest record comes
//! first; reading stops at the first record at or below the watermark.

use tracing::warn;
use windows::core::PCWSTR;
use windows::Win32::Foundation::ERROR_NO_MORE_ITEMS;
use windows::Win32::System::EventLog::{
    EvtClose, EvtNext, EvtQuery, EvtQueryChannelPath, EvtQueryReverseDirection, EvtRender,
    EvtRenderEventXml, EVT_HANDLE,
};

use crate::error::SourceError;
use crate::source::{EventSource, SourceRecord};
use crate::xml::record_id_from_xml;

const BATCH_SIZE: usize = 100;
const NEXT_TIMEOUT_MS: u32 = 1000;

/// Closes the wrapped handle on drop.
struct EvtHandle(EVT_HANDLE);

impl Drop for EvtHandle {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            unsafe {
                let _ = EvtClose(self.0);
            }
        }
    }
}

fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

fn open_reverse_query(channel: &str) -> Result<EvtHandle, SourceError> {
    let path = to_wide(channel);
    let handle = unsafe {
        EvtQuery(
            None,
            PCWSTR(path.as_ptr()),
            PCWSTR::null(),
            EvtQueryChannelPath.0 | EvtQueryReverseDirection.0,
        )
    }
    .map_err(|e| SourceError::ChannelUnavailable {
        channel: channel.to_string(),
        message: e.to_string(),
    })?;

    if handle.is_invalid() {
        return Err(SourceError::ChannelUnavailable {
            channel: channel.to_string(),
            message: "invalid query handle".to_string(),
        });
    }
    Ok(EvtHandle(handle))
}

/// Fetch up to `max` event handles. An empty result means the query is
/// exhausted.
fn next_batch(channel: &str, query: &EvtHandle, max: usize) -> Result<Vec<EvtHandle>, SourceError> {
    let mut raw = vec![0isize; max];
    let mut returned = 0u32;

    match unsafe { EvtNext(query.0, &mut raw, NEXT_TIMEOUT_MS, 0, &mut returned) } {
        Ok(()) => Ok(raw
            .into_iter()
            .take(returned as usize)
            .map(|h| EvtHandle(EVT_HANDLE(h)))
            .collect()),
        Err(e) if e.code() == ERROR_NO_MORE_ITEMS.to_hresult() => Ok(Vec::new()),
        Err(e) => Err(SourceError::Read {
            channel: channel.to_string(),
            message: e.to_string(),
        }),
    }
}

fn render_xml(event: &EvtHandle) -> Result<String, String> {
    let mut required = 0u32;
    let mut property_count = 0u32;
    // Size query; fails with ERROR_INSUFFICIENT_BUFFER and reports the size.
    let _ = unsafe {
        EvtRender(
            EVT_HANDLE::default(),
            event.0,
            EvtRenderEventXml.0,
            0,
            None,
            &mut required,
            &mut property_count,
        )
    };
    if required == 0 {
        return Err("EvtRender size query returned 0".to_string());
    }

    let mut buffer = vec![0u16; (required as usize).div_ceil(2) + 1];
    let mut used = 0u32;
    unsafe {
        EvtRender(
            EVT_HANDLE::default(),
            event.0,
            EvtRenderEventXml.0,
            (buffer.len() * 2) as u32,
            Some(buffer.as_mut_ptr() as *mut _),
            &mut used,
            &mut property_count,
        )
    }
    .map_err(|e| e.to_string())?;

    let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
    Ok(String::from_utf16_lossy(&buffer[..len]))
}

/// Reads from the local machine's event log.
#[derive(Debug, Default)]
pub struct WevtSource;

impl WevtSource {
    pub fn new() -> Self {
        Self
    }
}

impl EventSource for WevtSource {
    fn latest_record_id(&mut self, channel: &str) -> Result<Option<u64>, SourceError> {
        let query = open_reverse_query(channel)?;
        let Some(newest) = next_batch(channel, &query, 1)?.into_iter().next() else {
            return Ok(None);
        };
        let xml = render_xml(&newest).map_err(|message| SourceError::Read {
            channel: channel.to_string(),
            message,
        })?;
        Ok(record_id_from_xml(&xml))
    }

    fn read_newer(
        &mut self,
        channel: &str,
        watermark: u64,
    ) -> Result<Vec<SourceRecord>, SourceError> {
        let query = open_reverse_query(channel)?;
        let mut records = Vec::new();

        'query: loop {
            let batch = next_batch(channel, &query, BATCH_SIZE)?;
            if batch.is_empty() {
                break;
            }
            for event in &batch {
                let xml = match render_xml(event) {
                    Ok(xml) => xml,
                    Err(e) => {
                        warn!(channel = %channel, error = %e, "failed to render event");
                        continue;
                    }
                };
                let Some(record_id) = record_id_from_xml(&xml) else {
                    warn!(channel = %channel, "rendered event has no record id");
                    continue;
                };
                if record_id <= watermark {
                    break 'query;
                }
                records.push(SourceRecord { record_id, xml });
            }
        }

        Ok(records)
    }
}
