use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A detection: one rule whose condition held for one event.
///
/// The payload fields hold JSON text exactly as persisted by the match store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub rule_title: String,
    /// Level as authored in the rule (case preserved).
    pub rule_level: String,
    pub log_source: String,
    pub detection_details: String,
    pub log_entry: String,
    pub timestamp: DateTime<Utc>,
}

impl MatchResult {
    /// Build a match stamped with the current time, serializing the payloads.
    pub fn new(
        rule_title: impl Into<String>,
        rule_level: impl Into<String>,
        log_source: &serde_json::Value,
        detection: &serde_json::Value,
        event: &serde_json::Value,
    ) -> Self {
        Self {
            rule_title: rule_title.into(),
            rule_level: rule_level.into(),
            log_source: log_source.to_string(),
            detection_details: detection.to_string(),
            log_entry: event.to_string(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payloads_are_serialized_json() {
        let m = MatchResult::new(
            "Whoami Execution",
            "High",
            &json!({"product": "windows", "service": "security"}),
            &json!({"selection": {"CommandLine|contains": "whoami"}, "condition": "selection"}),
            &json!({"winlog": {"event_id": 4688}}),
        );

        assert_eq!(m.rule_level, "High");
        let source: serde_json::Value = serde_json::from_str(&m.log_source).unwrap();
        assert_eq!(source["product"], "windows");
        let entry: serde_json::Value = serde_json::from_str(&m.log_entry).unwrap();
        assert_eq!(entry["winlog"]["event_id"], 4688);
    }
}
