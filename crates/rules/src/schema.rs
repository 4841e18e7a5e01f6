//! SIGMA rule document as read from a YAML file.

use aegis_core::MatchResult;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key inside the detection block that holds the condition expression.
pub const CONDITION_KEY: &str = "condition";

/// A single detection rule.
///
/// Only the keys the engine uses are modelled; everything else in the file
/// (`id`, `status`, `description`, `tags`, ...) is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigmaRule {
    #[serde(default = "not_available")]
    pub title: String,
    #[serde(default = "not_available")]
    pub level: String,
    /// Free-form metadata describing which logs the rule targets.
    #[serde(default = "empty_object")]
    pub logsource: Value,
    /// Named selections plus the `condition` entry.
    #[serde(default)]
    pub detection: Map<String, Value>,
}

fn not_available() -> String {
    "N/A".to_string()
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

impl SigmaRule {
    /// Parse a rule from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// The raw `condition` entry, if present.
    pub fn condition(&self) -> Option<&Value> {
        self.detection.get(CONDITION_KEY)
    }

    /// Every detection entry except `condition`, in key order.
    pub fn selections(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.detection.iter().filter(|(k, _)| k.as_str() != CONDITION_KEY)
    }

    /// Record a detection of this rule against `event`.
    pub fn to_match(&self, event: &Value) -> MatchResult {
        MatchResult::new(
            self.title.clone(),
            self.level.clone(),
            &self.logsource,
            &Value::Object(self.detection.clone()),
            event,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_rule() {
        let rule = SigmaRule::from_yaml(
            r#"
title: Whoami Execution
id: 502b42de-4306-40b4-9596-6f590c81f073
level: high
logsource:
  product: windows
  category: process_creation
detection:
  selection:
    CommandLine|contains: whoami
  condition: selection
"#,
        )
        .unwrap();

        assert_eq!(rule.title, "Whoami Execution");
        assert_eq!(rule.level, "high");
        assert_eq!(rule.logsource["category"], "process_creation");
        assert_eq!(rule.condition(), Some(&Value::String("selection".into())));
        let names: Vec<_> = rule.selections().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, vec!["selection"]);
    }

    #[test]
    fn missing_metadata_defaults() {
        let rule = SigmaRule::from_yaml("detection:\n  sel:\n    a: b\n").unwrap();
        assert_eq!(rule.title, "N/A");
        assert_eq!(rule.level, "N/A");
        assert!(rule.logsource.as_object().unwrap().is_empty());
        assert!(rule.condition().is_none());
    }

    #[test]
    fn level_case_is_preserved() {
        let yaml = "title: t\nlevel: CRITICAL\ndetection: {s: {a: b}, condition: s}\n";
        let rule = SigmaRule::from_yaml(yaml).unwrap();
        let m = rule.to_match(&serde_json::json!({}));
        assert_eq!(m.rule_level, "CRITICAL");
        let detection: Value = serde_json::from_str(&m.detection_details).unwrap();
        assert_eq!(detection["condition"], "s");
    }
}
