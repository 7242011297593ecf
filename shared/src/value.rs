//! The shared value model.
//!
//! `SnapshotValue` is the currency every other module trades in: schema
//! default values, snapshot contents and packet payloads. It derives serde so
//! it travels through bincode unchanged, and converts to plain JSON for the
//! schema document and JSON snapshot output.

use crate::error::SnapshotError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A tagged, self-describing value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum SnapshotValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    Array(Vec<SnapshotValue>),
    Object(BTreeMap<String, SnapshotValue>),
}

impl SnapshotValue {
    pub fn object() -> Self {
        SnapshotValue::Object(BTreeMap::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SnapshotValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SnapshotValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SnapshotValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Integers widen to doubles; doubles are returned as-is.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SnapshotValue::Int(i) => Some(*i as f64),
            SnapshotValue::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SnapshotValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<SnapshotValue>> {
        match self {
            SnapshotValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, SnapshotValue>> {
        match self {
            SnapshotValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Short name of the variant, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            SnapshotValue::Null => "null",
            SnapshotValue::Bool(_) => "bool",
            SnapshotValue::Int(_) => "int",
            SnapshotValue::Double(_) => "double",
            SnapshotValue::String(_) => "string",
            SnapshotValue::Array(_) => "array",
            SnapshotValue::Object(_) => "object",
        }
    }

    /// Walks a dot-separated path through objects and arrays.
    ///
    /// Array segments must be decimal indices. An empty path returns `self`.
    pub fn get_path(&self, path: &str) -> Option<&SnapshotValue> {
        if path.is_empty() {
            return Some(self);
        }

        let mut current = self;
        for segment in path.split('.') {
            current = match current {
                SnapshotValue::Object(map) => map.get(segment)?,
                SnapshotValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Deep-merges `other` into `self`.
    ///
    /// Objects merge key by key; any other combination replaces the value.
    pub fn merge(&mut self, other: SnapshotValue) {
        match (self, other) {
            (SnapshotValue::Object(mine), SnapshotValue::Object(theirs)) => {
                for (key, value) in theirs {
                    match mine.get_mut(&key) {
                        Some(existing) => existing.merge(value),
                        None => {
                            mine.insert(key, value);
                        }
                    }
                }
            }
            (slot, other) => *slot = other,
        }
    }

    /// Converts any serde-serializable value through its JSON form.
    ///
    /// This is the fallback used for composite values that are not state
    /// nodes. Failures (for example maps keyed by non-string types) are
    /// reported as conversion errors naming `type_name`.
    pub fn from_serialize<T: Serialize + ?Sized>(
        value: &T,
        type_name: &str,
    ) -> Result<Self, SnapshotError> {
        let json = serde_json::to_value(value).map_err(|e| SnapshotError::Conversion {
            field: String::new(),
            type_name: type_name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_json(json))
    }

    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => SnapshotValue::Null,
            serde_json::Value::Bool(b) => SnapshotValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => SnapshotValue::Int(i),
                // u64 values above i64::MAX and all floats land here
                None => SnapshotValue::Double(n.as_f64().unwrap_or(0.0)),
            },
            serde_json::Value::String(s) => SnapshotValue::String(s),
            serde_json::Value::Array(items) => {
                SnapshotValue::Array(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => SnapshotValue::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Plain JSON rendering. Non-finite doubles become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            SnapshotValue::Null => serde_json::Value::Null,
            SnapshotValue::Bool(b) => serde_json::Value::Bool(*b),
            SnapshotValue::Int(i) => serde_json::Value::from(*i),
            SnapshotValue::Double(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            SnapshotValue::String(s) => serde_json::Value::String(s.clone()),
            SnapshotValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(|v| v.to_json()).collect())
            }
            SnapshotValue::Object(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

impl From<bool> for SnapshotValue {
    fn from(value: bool) -> Self {
        SnapshotValue::Bool(value)
    }
}

impl From<i64> for SnapshotValue {
    fn from(value: i64) -> Self {
        SnapshotValue::Int(value)
    }
}

impl From<i32> for SnapshotValue {
    fn from(value: i32) -> Self {
        SnapshotValue::Int(value as i64)
    }
}

impl From<f64> for SnapshotValue {
    fn from(value: f64) -> Self {
        SnapshotValue::Double(value)
    }
}

impl From<&str> for SnapshotValue {
    fn from(value: &str) -> Self {
        SnapshotValue::String(value.to_string())
    }
}

impl From<String> for SnapshotValue {
    fn from(value: String) -> Self {
        SnapshotValue::String(value)
    }
}

impl From<Vec<SnapshotValue>> for SnapshotValue {
    fn from(value: Vec<SnapshotValue>) -> Self {
        SnapshotValue::Array(value)
    }
}

impl From<BTreeMap<String, SnapshotValue>> for SnapshotValue {
    fn from(value: BTreeMap<String, SnapshotValue>) -> Self {
        SnapshotValue::Object(value)
    }
}

/// Serde adapter writing `Option<SnapshotValue>` as plain JSON.
///
/// Used by the schema document where `default` must be an ordinary JSON
/// value rather than the tagged enum form.
pub mod json_option {
    use super::SnapshotValue;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<SnapshotValue>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.as_ref().map(|v| v.to_json()).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<SnapshotValue>, D::Error>
    where
        D: Deserializer<'de>,
    {
        // a present `null` is a real default; a missing key is handled by `#[serde(default)]`
        let json = serde_json::Value::deserialize(deserializer)?;
        Ok(Some(SnapshotValue::from_json(json)))
    }
}

/// A materialised set of top-level field values.
///
/// Either a broadcast snapshot (identical for every viewer) or a per-player
/// snapshot (filtered for one viewer); the type does not distinguish them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    values: BTreeMap<String, SnapshotValue>,
}

impl StateSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, value: SnapshotValue) {
        self.values.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<&SnapshotValue> {
        self.values.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SnapshotValue)> {
        self.values.iter()
    }

    /// Resolves `field.sub.path` starting at a top-level field.
    pub fn value_at(&self, path: &str) -> Option<&SnapshotValue> {
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, rest),
            None => (path, ""),
        };
        self.values.get(head)?.get_path(rest)
    }

    /// Returns a copy of `self` with `other` deep-merged on top.
    ///
    /// Merging a viewer's per-player part onto the broadcast part reproduces
    /// that viewer's full view.
    pub fn merged_with(&self, other: &StateSnapshot) -> StateSnapshot {
        let mut merged = self.clone();
        for (field, value) in &other.values {
            match merged.values.get_mut(field) {
                Some(existing) => existing.merge(value.clone()),
                None => {
                    merged.values.insert(field.clone(), value.clone());
                }
            }
        }
        merged
    }

    /// The whole snapshot as a single object value.
    pub fn into_value(self) -> SnapshotValue {
        SnapshotValue::Object(self.values)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl FromIterator<(String, SnapshotValue)> for StateSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, SnapshotValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
