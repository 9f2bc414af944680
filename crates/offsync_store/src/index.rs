//! Secondary indexes over JSON records.

use crate::schema::IndexSpec;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Encodes an indexable value into an ordered key.
///
/// Values of different JSON types never collide (`"1"` vs `1`). Missing
/// fields and `null` are not indexed.
pub fn index_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(format!("b:{b}")),
        Value::Number(n) => Some(format!("n:{n}")),
        Value::String(s) => Some(format!("s:{s}")),
        other => Some(format!("j:{other}")),
    }
}

/// A secondary index mapping indexed values to primary keys.
#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    spec: IndexSpec,
    entries: BTreeMap<String, BTreeSet<String>>,
}

impl SecondaryIndex {
    /// Creates an empty index.
    pub fn new(spec: IndexSpec) -> Self {
        Self {
            spec,
            entries: BTreeMap::new(),
        }
    }

    /// The index declaration.
    pub fn spec(&self) -> &IndexSpec {
        &self.spec
    }

    fn key_of(&self, record: &Value) -> Option<String> {
        record.get(&self.spec.key_path).and_then(index_key)
    }

    /// Returns the conflicting indexed value if writing `record` under
    /// `primary` would break uniqueness.
    pub fn unique_conflict(&self, primary: &str, record: &Value) -> Option<String> {
        if !self.spec.unique {
            return None;
        }
        let key = self.key_of(record)?;
        let holders = self.entries.get(&key)?;
        holders
            .iter()
            .any(|holder| holder != primary)
            .then(|| record[&self.spec.key_path].to_string())
    }

    /// Adds `record` under `primary`.
    pub fn insert(&mut self, primary: &str, record: &Value) {
        if let Some(key) = self.key_of(record) {
            self.entries
                .entry(key)
                .or_default()
                .insert(primary.to_string());
        }
    }

    /// Removes `record` under `primary`.
    pub fn remove(&mut self, primary: &str, record: &Value) {
        if let Some(key) = self.key_of(record) {
            if let Some(holders) = self.entries.get_mut(&key) {
                holders.remove(primary);
                if holders.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }

    /// Primary keys of records whose indexed field equals `value`.
    pub fn lookup(&self, value: &Value) -> Vec<String> {
        index_key(value)
            .and_then(|key| self.entries.get(&key))
            .map(|holders| holders.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Drops all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of distinct indexed values.
    pub fn distinct_values(&self) -> usize {
        self.entries.len()
    }
}
