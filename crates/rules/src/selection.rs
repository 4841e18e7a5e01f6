//! Selection predicates compiled from a rule's detection block.
//!
//! A selection is a mapping (every field matcher must match) or a list (any
//! element must match), nested arbitrarily. The YAML shape is compiled once
//! into a [`Predicate`] tree so events never re-interpret the rule text.

use regex::{Regex, RegexBuilder};
use serde_json::Value;
use tracing::warn;

use crate::flatten::FlattenedEvent;

// ── Field resolution ────────────────────────────────────────────────

/// Logical SIGMA field names → flattened event-log paths.
pub const WINLOG_FIELD_ALIASES: &[(&str, &str)] = &[
    ("image", "winlog.event_data.newprocessname"),
    ("commandline", "winlog.event_data.commandline"),
    ("parentimage", "winlog.event_data.parentprocessname"),
    ("processid", "winlog.event_data.newprocessid"),
    ("parentprocessid", "winlog.event_data.creatorprocessid"),
];

const WINLOG_PREFIX: &str = "winlog.";

fn alias(field: &str) -> Option<&'static str> {
    WINLOG_FIELD_ALIASES
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, path)| *path)
}

/// Maps a rule's field name onto a value in a flattened event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldResolver {
    /// When a rule asks for `commandline` and the event has none, use the
    /// resolved `image` value instead. Kept for parity with existing rule
    /// sets; it can turn a missing field into a match.
    pub commandline_image_fallback: bool,
}

impl Default for FieldResolver {
    fn default() -> Self {
        Self {
            commandline_image_fallback: true,
        }
    }
}

impl FieldResolver {
    pub fn new(commandline_image_fallback: bool) -> Self {
        Self {
            commandline_image_fallback,
        }
    }

    /// Resolve a lowercase field name: alias table first, then a retry under
    /// the `winlog.` namespace, then the commandline fallback.
    pub fn resolve<'e>(&self, field: &str, event: &'e FlattenedEvent) -> Option<&'e Value> {
        let path = alias(field).unwrap_or(field);

        let mut value = event.get(path);
        if value.is_none() && !path.starts_with(WINLOG_PREFIX) {
            value = event.get(&format!("{}{}", WINLOG_PREFIX, path));
        }

        if value.is_none() && self.commandline_image_fallback && field == "commandline" {
            value = alias("image").and_then(|image| event.get(image));
        }

        value
    }
}

// ── Modifiers ───────────────────────────────────────────────────────

/// How an expected value is compared against an event value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modifier {
    Contains,
    StartsWith,
    EndsWith,
    Regex,
    /// Anything else; never matches.
    Unsupported(String),
}

impl Modifier {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "contains" => Modifier::Contains,
            "startswith" => Modifier::StartsWith,
            "endswith" => Modifier::EndsWith,
            "re" => Modifier::Regex,
            other => Modifier::Unsupported(other.to_string()),
        }
    }
}

/// A compiled expected value.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Lowercased text for the substring modifiers.
    Text(String),
    /// Case-insensitive regex for `re`.
    Regex(Regex),
    /// A pattern that failed to compile; never matches.
    Invalid,
}

impl Pattern {
    fn matches(&self, modifier: &Modifier, actual: &str) -> bool {
        let expected = match (self, modifier) {
            (Pattern::Regex(re), Modifier::Regex) => return re.is_match(actual),
            (Pattern::Text(expected), _) => expected.as_str(),
            _ => return false,
        };
        match modifier {
            Modifier::Contains => actual.to_lowercase().contains(expected),
            Modifier::StartsWith => actual.to_lowercase().starts_with(expected),
            Modifier::EndsWith => actual.to_lowercase().ends_with(expected),
            _ => false,
        }
    }
}

// ── Predicate ───────────────────────────────────────────────────────

/// A single `field|modifier: values` entry.
#[derive(Debug, Clone)]
pub struct FieldMatch {
    /// Lowercased logical field name (modifier stripped).
    pub field: String,
    pub modifier: Modifier,
    pub values: Vec<Pattern>,
}

impl FieldMatch {
    /// Compile a detection key (`CommandLine|contains`) and its expected
    /// value(s). Only the first modifier is honoured.
    pub fn compile(key: &str, expected: &Value) -> Self {
        let mut parts = key.split('|');
        let field = parts.next().unwrap_or_default().trim().to_lowercase();
        let modifier = parts.next().map(Modifier::parse).unwrap_or(Modifier::Contains);

        if let Modifier::Unsupported(name) = &modifier {
            warn!(
                field = %field,
                modifier = %name,
                "unsupported modifier, field will never match"
            );
        }

        let values = expected_texts(expected)
            .into_iter()
            .map(|text| match modifier {
                Modifier::Regex => match RegexBuilder::new(&text).case_insensitive(true).build() {
                    Ok(re) => Pattern::Regex(re),
                    Err(e) => {
                        warn!(
                            field = %field,
                            pattern = %text,
                            error = %e,
                            "invalid regex, value will never match"
                        );
                        Pattern::Invalid
                    }
                },
                _ => Pattern::Text(text.to_lowercase()),
            })
            .collect();

        Self { field, modifier, values }
    }

    /// True iff any expected value matches any actual value.
    pub fn evaluate(&self, event: &FlattenedEvent, resolver: &FieldResolver) -> bool {
        let Some(actual) = resolver.resolve(&self.field, event) else {
            return false;
        };
        let actual = actual_texts(actual);
        self.values
            .iter()
            .any(|pattern| actual.iter().any(|a| pattern.matches(&self.modifier, a)))
    }
}

/// Compiled selection tree.
#[derive(Debug, Clone)]
pub enum Predicate {
    FieldMatch(FieldMatch),
    /// Every child must hold (a mapping). Empty is true.
    All(Vec<Predicate>),
    /// At least one child must hold (a list). Empty is false.
    Any(Vec<Predicate>),
}

impl Predicate {
    /// Compile a selection body. Shapes other than mappings and lists
    /// compile to an always-false predicate.
    pub fn compile(body: &Value) -> Self {
        match body {
            Value::Object(map) => Predicate::All(
                map.iter()
                    .map(|(key, expected)| {
                        Predicate::FieldMatch(FieldMatch::compile(key, expected))
                    })
                    .collect(),
            ),
            Value::Array(items) => Predicate::Any(items.iter().map(Predicate::compile).collect()),
            other => {
                warn!(
                    selection = %other,
                    "selection is neither a mapping nor a list, it will never match"
                );
                Predicate::Any(Vec::new())
            }
        }
    }

    pub fn evaluate(&self, event: &FlattenedEvent, resolver: &FieldResolver) -> bool {
        match self {
            Predicate::FieldMatch(fm) => fm.evaluate(event, resolver),
            Predicate::All(children) => children.iter().all(|c| c.evaluate(event, resolver)),
            Predicate::Any(children) => children.iter().any(|c| c.evaluate(event, resolver)),
        }
    }
}

// ── Value rendering ─────────────────────────────────────────────────

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Expected values: a list contributes each element, anything else itself.
fn expected_texts(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().map(scalar_text).collect(),
        other => vec![scalar_text(other)],
    }
}

/// Actual values: like expected ones, but `null` elements carry nothing.
fn actual_texts(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter(|v| !v.is_null()).map(scalar_text).collect(),
        other => vec![scalar_text(other)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn process_event() -> FlattenedEvent {
        FlattenedEvent::from_value(&json!({
            "winlog": {
                "event_id": 4688,
                "event_data": {
                    "CommandLine": "cmd.exe /c WhoAmI /all",
                    "NewProcessName": "C:\\Windows\\System32\\cmd.exe",
                    "ParentProcessName": "C:\\Windows\\explorer.exe",
                    "Tags": ["lateral", "recon"]
                }
            }
        }))
    }

    fn holds(selection: Value) -> bool {
        Predicate::compile(&selection).evaluate(&process_event(), &FieldResolver::default())
    }

    #[test]
    fn default_modifier_is_case_insensitive_contains() {
        assert!(holds(json!({"CommandLine": "whoami"})));
        assert!(holds(json!({"commandline|contains": "WHOAMI"})));
        assert!(!holds(json!({"CommandLine": "net user"})));
    }

    #[test]
    fn startswith_and_endswith() {
        assert!(holds(json!({"Image|endswith": "\\cmd.exe"})));
        assert!(holds(json!({"ParentImage|startswith": "c:\\windows"})));
        assert!(!holds(json!({"Image|startswith": "cmd"})));
    }

    #[test]
    fn regex_is_a_case_insensitive_search() {
        assert!(holds(json!({"CommandLine|re": "who\\w+\\s+/ALL$"})));
        assert!(!holds(json!({"CommandLine|re": "^whoami"})));
    }

    #[test]
    fn invalid_regex_and_unknown_modifier_never_match() {
        assert!(!holds(json!({"CommandLine|re": "(unclosed"})));
        assert!(!holds(json!({"CommandLine|base64": "whoami"})));
    }

    #[test]
    fn mapping_requires_every_field_spec() {
        assert!(holds(json!({"CommandLine": "whoami", "Image|endswith": "cmd.exe"})));
        assert!(!holds(json!({"CommandLine": "whoami", "Image|endswith": "powershell.exe"})));
    }

    #[test]
    fn list_requires_any_element() {
        assert!(holds(json!([{"CommandLine": "net user"}, {"CommandLine": "whoami"}])));
        assert!(!holds(json!([{"CommandLine": "net user"}, {"Image": "powershell"}])));
        assert!(!holds(json!([])));
    }

    #[test]
    fn nested_and_or() {
        assert!(holds(json!([
            [{"CommandLine": "nope"}, {"Image|endswith": "cmd.exe"}],
            {"CommandLine": "never"}
        ])));
    }

    #[test]
    fn list_values_match_any_against_any() {
        assert!(holds(json!({"CommandLine|contains": ["mimikatz", "whoami"]})));
        assert!(holds(json!({"event_data.tags": ["recon"]})));
        assert!(holds(json!({"event_data.tags|startswith": "lat"})));
        // The field resolves; only the values differ.
        assert!(!holds(json!({"event_data.tags": ["exfil", "impact"]})));
    }

    #[test]
    fn bare_key_retries_under_winlog_namespace() {
        assert!(holds(json!({"event_id": 4688})));
        assert!(holds(json!({"event_data.commandline|contains": "whoami"})));
        assert!(!holds(json!({"EventID": 4688})));
    }

    #[test]
    fn missing_field_is_false() {
        assert!(!holds(json!({"TargetUserName": "admin"})));
    }

    #[test]
    fn scalar_selection_never_matches() {
        assert!(!holds(json!("whoami")));
    }

    #[test]
    fn commandline_falls_back_to_image() {
        let event = FlattenedEvent::from_value(&json!({
            "winlog": {"event_data": {"NewProcessName": "C:\\Tools\\whoami.exe"}}
        }));
        let selection = Predicate::compile(&json!({"CommandLine|contains": "whoami"}));

        assert!(selection.evaluate(&event, &FieldResolver::new(true)));
        assert!(!selection.evaluate(&event, &FieldResolver::new(false)));
    }
}
