//! Single-level projection of nested event data.
//!
//! Nested objects are collapsed into dotted keys and every key is lowercased,
//! so `{"winlog": {"event_data": {"CommandLine": "x"}}}` becomes
//! `{"winlog.event_data.commandline": "x"}`. Scalars and arrays are leaves.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

/// A flattened event: dotted lowercase key → leaf value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedEvent {
    fields: BTreeMap<String, Value>,
}

impl FlattenedEvent {
    /// Flatten an arbitrary JSON value. Anything but an object yields an
    /// empty event.
    pub fn from_value(value: &Value) -> Self {
        let mut fields = BTreeMap::new();
        if let Value::Object(map) = value {
            flatten_into("", map, &mut fields);
        }
        Self { fields }
    }

    /// Look up a leaf. `null` leaves resolve as absent.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// The flattened form as a JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

fn flatten_into(prefix: &str, map: &Map<String, Value>, out: &mut BTreeMap<String, Value>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.to_lowercase()
        } else {
            format!("{}.{}", prefix, key.to_lowercase())
        };
        match value {
            Value::Object(inner) => flatten_into(&path, inner, out),
            leaf => {
                out.insert(path, leaf.clone());
            }
        }
    }
}
