//! Normalization of rendered event XML.
//!
//! Produces the sink's flat shape: `System/Provider@Name`, `System/EventID`,
//! `System/EventRecordID`, every named `EventData/Data` entry, and every
//! `UserData` descendant that carries text, keyed by its local tag name.
//! Namespaces are ignored.

use std::collections::BTreeMap;

use aegis_core::WinlogRecord;
use quick_xml::events::{BytesStart, Event as XmlEvent};
use quick_xml::Reader;

use crate::error::EventXmlError;

const SYSTEM: &str = "System";
const EVENT_DATA: &str = "EventData";
const USER_DATA: &str = "UserData";

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn attr(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.attributes()
        .filter_map(Result::ok)
        .find(|a| a.key.local_name().as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn parse_number<T: std::str::FromStr>(
    field: &'static str,
    value: &str,
) -> Result<T, EventXmlError> {
    value.parse().map_err(|_| EventXmlError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

/// Normalize one rendered event into a [`WinlogRecord`] for `channel`.
pub fn parse_event_xml(xml: &str, channel: &str) -> Result<WinlogRecord, EventXmlError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut data_name: Option<String> = None;

    let mut provider_name: Option<String> = None;
    let mut event_id: Option<u32> = None;
    let mut record_id: Option<u64> = None;
    let mut event_data = BTreeMap::new();

    loop {
        match reader.read_event()? {
            XmlEvent::Start(e) => {
                let name = local_name(&e);
                let parent = path.last().map(String::as_str);
                match (parent, name.as_str()) {
                    (Some(SYSTEM), "Provider") => {
                        provider_name = Some(attr(&e, "Name").unwrap_or_default())
                    }
                    (Some(EVENT_DATA), "Data") => data_name = attr(&e, "Name"),
                    _ => {}
                }
                path.push(name);
                text.clear();
            }
            XmlEvent::Empty(e) => {
                // Self-closing elements carry no text; only the provider matters.
                if path.last().map(String::as_str) == Some(SYSTEM) && local_name(&e) == "Provider" {
                    provider_name = Some(attr(&e, "Name").unwrap_or_default());
                }
            }
            XmlEvent::Text(t) => text.push_str(&t.unescape()?),
            XmlEvent::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
            XmlEvent::End(_) => {
                let name = path.pop().unwrap_or_default();
                let value = text.trim();
                match (path.last().map(String::as_str), name.as_str()) {
                    (Some(SYSTEM), "EventID") => event_id = Some(parse_number("EventID", value)?),
                    (Some(SYSTEM), "EventRecordID") => {
                        record_id = Some(parse_number("EventRecordID", value)?)
                    }
                    (Some(EVENT_DATA), "Data") => {
                        if let Some(key) = data_name.take() {
                            if !value.is_empty() {
                                event_data.insert(key, value.to_string());
                            }
                        }
                    }
                    _ if !value.is_empty() && path.iter().any(|p| p == USER_DATA) => {
                        event_data.insert(name.clone(), value.to_string());
                    }
                    _ => {}
                }
                text.clear();
            }
            XmlEvent::Eof => break,
            _ => {}
        }
    }

    if !path.is_empty() {
        return Err(EventXmlError::Truncated);
    }

    Ok(WinlogRecord {
        channel: channel.to_string(),
        provider_name: provider_name.ok_or(EventXmlError::MissingField("Provider"))?,
        event_id: event_id.ok_or(EventXmlError::MissingField("EventID"))?,
        record_id: record_id.ok_or(EventXmlError::MissingField("EventRecordID"))?,
        event_data,
    })
}

/// Extract only `System/EventRecordID`, without normalizing the rest.
pub fn record_id_from_xml(xml: &str) -> Option<u64> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut path: Vec<String> = Vec::new();
    loop {
        match reader.read_event().ok()? {
            XmlEvent::Start(e) => path.push(local_name(&e)),
            XmlEvent::End(_) => {
                path.pop();
            }
            XmlEvent::Text(t) => {
                let in_record_id = path.len() >= 2
                    && path[path.len() - 1] == "EventRecordID"
                    && path[path.len() - 2] == SYSTEM;
                if in_record_id {
                    return t.unescape().ok()?.trim().parse().ok();
                }
            }
            XmlEvent::Eof => return None,
            _ => {}
        }
    }
}
