use crate::types::MapArray;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Header value as delivered by an upstream parser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl MetaValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetaValue::Float(f) => Some(*f),
            MetaValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetaValue::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetaValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetaValue::Bool(b) => write!(f, "{}", if *b { "T" } else { "F" }),
            MetaValue::Int(i) => write!(f, "{}", i),
            MetaValue::Float(v) => write!(f, "{}", v),
            MetaValue::Str(s) => write!(f, "'{}'", s),
        }
    }
}

impl From<f64> for MetaValue {
    fn from(v: f64) -> Self {
        MetaValue::Float(v)
    }
}

impl From<i64> for MetaValue {
    fn from(v: i64) -> Self {
        MetaValue::Int(v)
    }
}

impl From<i32> for MetaValue {
    fn from(v: i32) -> Self {
        MetaValue::Int(v as i64)
    }
}

impl From<bool> for MetaValue {
    fn from(v: bool) -> Self {
        MetaValue::Bool(v)
    }
}

impl From<&str> for MetaValue {
    fn from(v: &str) -> Self {
        MetaValue::Str(v.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(v: String) -> Self {
        MetaValue::Str(v)
    }
}

/// Free-form header mapping with case-insensitive keywords.
///
/// Keywords are stored lower-cased; insertion order is kept so a header can be
/// written back out in the order it was read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetaDict {
    entries: HashMap<String, MetaValue>,
    keyword_order: Vec<String>,
}

impl MetaDict {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<MetaValue>) {
        let key_lower = key.trim().to_lowercase();
        if !self.entries.contains_key(&key_lower) {
            self.keyword_order.push(key_lower.clone());
        }
        self.entries.insert(key_lower, value.into());
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<MetaValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&MetaValue> {
        self.entries.get(&key.trim().to_lowercase())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<MetaValue> {
        let key_lower = key.trim().to_lowercase();
        let removed = self.entries.remove(&key_lower);
        if removed.is_some() {
            self.keyword_order.retain(|k| k != &key_lower);
        }
        removed
    }

    /// String value of `key`, trimmed; `None` when absent or not a string
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str()).map(|s| s.trim())
    }

    /// First alias present in the header, with the alias that matched
    pub fn first_present<'a>(&self, aliases: &[&'a str]) -> Option<(&'a str, &MetaValue)> {
        aliases
            .iter()
            .find_map(|alias| self.get(alias).map(|value| (*alias, value)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate keyword/value pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetaValue)> {
        self.keyword_order
            .iter()
            .filter_map(|k| self.entries.get(k).map(|v| (k.as_str(), v)))
    }
}

impl<K: AsRef<str>, V: Into<MetaValue>> FromIterator<(K, V)> for MetaDict {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut meta = MetaDict::new();
        for (k, v) in iter {
            meta.insert(k.as_ref(), v);
        }
        meta
    }
}

/// Parsed image plus its header, as handed over by an external reader
#[derive(Debug, Clone)]
pub struct RawImageInput {
    pub data: MapArray,
    pub meta: MetaDict,
}

impl RawImageInput {
    pub fn new(data: MapArray, meta: MetaDict) -> Self {
        Self { data, meta }
    }
}
