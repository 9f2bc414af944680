//! In-memory state of one collection.

use crate::error::{StoreError, StoreResult};
use crate::index::SecondaryIndex;
use crate::schema::{CollectionSpec, IndexSpec};
use serde_json::Value;
use std::collections::BTreeMap;

/// Records of one collection plus their secondary indexes.
#[derive(Debug, Clone)]
pub struct Collection {
    spec: CollectionSpec,
    records: BTreeMap<String, Value>,
    indexes: BTreeMap<String, SecondaryIndex>,
}

impl Collection {
    /// Creates an empty collection.
    pub fn new(spec: CollectionSpec) -> Self {
        let indexes = spec
            .indexes
            .iter()
            .map(|i| (i.name.clone(), SecondaryIndex::new(i.clone())))
            .collect();
        Self {
            spec,
            records: BTreeMap::new(),
            indexes,
        }
    }

    /// The collection declaration.
    pub fn spec(&self) -> &CollectionSpec {
        &self.spec
    }

    /// Extracts the primary key of `record`.
    ///
    /// Keys may be strings or numbers; numbers are keyed by their decimal form.
    pub fn primary_key(&self, record: &Value) -> StoreResult<String> {
        let name = &self.spec.name;
        if !record.is_object() {
            return Err(StoreError::invalid_record(name, "record is not an object"));
        }
        match record.get(&self.spec.key_path) {
            Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(StoreError::invalid_record(
                name,
                format!("missing primary key field `{}`", self.spec.key_path),
            )),
        }
    }

    /// Checks unique indexes for a write of `record` under `key`.
    pub fn check_unique(&self, key: &str, record: &Value) -> StoreResult<()> {
        for index in self.indexes.values() {
            if let Some(value) = index.unique_conflict(key, record) {
                return Err(StoreError::UniqueViolation {
                    collection: self.spec.name.clone(),
                    index: index.spec().name.clone(),
                    value,
                });
            }
        }
        Ok(())
    }

    /// Returns the record stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.records.get(key)
    }

    /// True if a record is stored under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    /// All records in primary key order.
    pub fn values(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.records.iter()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the collection holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Stores `record` under `key`, replacing any previous record.
    pub fn put(&mut self, key: String, record: Value) {
        if let Some(old) = self.records.get(&key) {
            for index in self.indexes.values_mut() {
                index.remove(&key, old);
            }
        }
        for index in self.indexes.values_mut() {
            index.insert(&key, &record);
        }
        self.records.insert(key, record);
    }

    /// Removes the record under `key`, returning it.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let old = self.records.remove(key)?;
        for index in self.indexes.values_mut() {
            index.remove(key, &old);
        }
        Some(old)
    }

    /// Removes every record.
    pub fn clear(&mut self) {
        self.records.clear();
        for index in self.indexes.values_mut() {
            index.clear();
        }
    }

    /// Adds an index and builds it over the existing records.
    pub fn add_index(&mut self, spec: IndexSpec) {
        if self.indexes.contains_key(&spec.name) {
            return;
        }
        let mut index = SecondaryIndex::new(spec.clone());
        for (key, record) in &self.records {
            index.insert(key, record);
        }
        self.indexes.insert(spec.name.clone(), index);
        self.spec.indexes.push(spec);
    }

    /// Primary keys matching `value` on the named index.
    pub fn lookup(&self, index: &str, value: &Value) -> StoreResult<Vec<String>> {
        let index = self
            .indexes
            .get(index)
            .ok_or_else(|| StoreError::UnknownIndex {
                collection: self.spec.name.clone(),
                index: index.to_string(),
            })?;
        Ok(index.lookup(value))
    }
}
