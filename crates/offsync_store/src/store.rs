//! The local store: durable named collections with secondary indexes.

use crate::backend::LogBackend;
use crate::collection::Collection;
use crate::dir::StoreDir;
use crate::error::{StoreError, StoreResult};
use crate::file::FileBackend;
use crate::frame::{self, LogEntry};
use crate::memory::MemoryBackend;
use crate::schema::{Schema, SchemaVersion, UpgradePlan, UpgradeStep};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Counters describing a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Recorded schema version.
    pub schema_version: SchemaVersion,
    /// Record count per collection.
    pub collections: BTreeMap<String, usize>,
    /// Bytes in the log.
    pub log_size: u64,
    /// Frames replayed when the store was opened.
    pub replayed_frames: usize,
}

/// Result of a compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Log size before compaction.
    pub before: u64,
    /// Log size after compaction.
    pub after: u64,
}

struct State {
    schema: Schema,
    collections: BTreeMap<String, Collection>,
    backend: Box<dyn LogBackend>,
    replayed_frames: usize,
    /// Log length to restore before the next append, set when cutting off
    /// a failed append did not succeed either.
    rollback_to: Option<u64>,
}

impl State {
    fn collection(&self, name: &str) -> StoreResult<&Collection> {
        self.collections
            .get(name)
            .ok_or_else(|| StoreError::unknown_collection(name))
    }

    fn collection_mut(&mut self, name: &str) -> StoreResult<&mut Collection> {
        self.collections
            .get_mut(name)
            .ok_or_else(|| StoreError::unknown_collection(name))
    }

    /// Appends one frame and makes it durable. Memory is only touched by
    /// the caller after this succeeds, and a failed append is cut back off
    /// the log, so a failed write leaves no trace.
    fn log(&mut self, entry: &LogEntry) -> StoreResult<()> {
        let bytes = frame::encode_frame(entry)?;
        if let Some(len) = self.rollback_to {
            self.backend.truncate(len)?;
            self.rollback_to = None;
        }

        let len = self.backend.size()?;
        let written = match self.backend.append(&bytes) {
            Ok(_) => self.backend.sync(),
            Err(e) => Err(e),
        };
        if let Err(error) = written {
            tracing::warn!(error = %error, log_len = len, "store append failed, rolling back");
            if let Err(rollback) = self.backend.truncate(len) {
                tracing::error!(error = %rollback, log_len = len, "store append rollback failed");
                self.rollback_to = Some(len);
            }
            return Err(error);
        }
        Ok(())
    }

    fn apply(&mut self, offset: u64, entry: LogEntry) -> StoreResult<()> {
        match entry {
            LogEntry::Schema(schema) => {
                let plan = self.schema.plan_upgrade(&schema);
                self.apply_plan(&plan);
            }
            LogEntry::Put {
                collection,
                key,
                record,
            } => {
                self.collection_mut(&collection)
                    .map_err(|_| missing_during_replay(offset, &collection))?
                    .put(key, record);
            }
            LogEntry::Delete { collection, key } => {
                self.collection_mut(&collection)
                    .map_err(|_| missing_during_replay(offset, &collection))?
                    .remove(&key);
            }
            LogEntry::Clear { collection } => {
                self.collection_mut(&collection)
                    .map_err(|_| missing_during_replay(offset, &collection))?
                    .clear();
            }
        }
        Ok(())
    }

    fn apply_plan(&mut self, plan: &UpgradePlan) {
        for step in &plan.steps {
            match step {
                UpgradeStep::CreateCollection { collection } => {
                    self.collections
                        .entry(collection.name.clone())
                        .or_insert_with(|| Collection::new(collection.clone()));
                }
                UpgradeStep::CreateIndex { collection, index } => {
                    if let Some(c) = self.collections.get_mut(collection) {
                        c.add_index(index.clone());
                    }
                }
            }
        }
        self.schema.apply(plan);
    }
}

fn missing_during_replay(offset: u64, collection: &str) -> StoreError {
    StoreError::corrupted(
        offset,
        format!("entry for collection {collection} precedes its schema"),
    )
}

/// Durable, indexed, versioned key-value storage with named collections.
///
/// Every mutating call is one log frame: it is either fully applied or
/// not at all, and it is durable when the call returns. There is no
/// atomicity across calls.
///
/// # Example
///
/// ```rust
/// use offsync_store::{CollectionSpec, LocalStore, Schema};
/// use serde_json::json;
///
/// let store = LocalStore::in_memory().unwrap();
/// store
///     .upgrade(&Schema::new(1).with_collection(CollectionSpec::new("users", "id")))
///     .unwrap();
///
/// store.add("users", json!({"id": "42", "name": "Bob"})).unwrap();
/// assert_eq!(store.get("users", "42").unwrap()["name"], "Bob");
/// ```
pub struct LocalStore {
    state: RwLock<State>,
    dir: Option<StoreDir>,
}

impl LocalStore {
    /// Opens a store rooted at `path`, replaying its log.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let dir = StoreDir::open(path)?;
        let backend = FileBackend::open(&dir.log_path())?;
        let mut store = Self::with_backend(Box::new(backend))?;
        store.dir = Some(dir);
        Ok(store)
    }

    /// Opens the store at the platform default location.
    ///
    /// Fails with `EnvironmentUnavailable` on hosts without a data directory.
    pub fn open_default() -> StoreResult<Self> {
        Self::open(&StoreDir::default_path()?)
    }

    /// Creates an ephemeral store.
    pub fn in_memory() -> StoreResult<Self> {
        Self::with_backend(Box::new(MemoryBackend::new()))
    }

    /// Builds a store over an arbitrary backend, replaying its log.
    ///
    /// A torn trailing frame (crash mid-append) is cut off; corruption inside
    /// a complete frame is an error.
    pub fn with_backend(mut backend: Box<dyn LogBackend>) -> StoreResult<Self> {
        let bytes = backend.read_all()?;
        let scan = frame::scan(&bytes)?;

        if scan.torn_tail {
            tracing::warn!(
                valid_len = scan.valid_len,
                log_len = bytes.len(),
                "discarding torn frame at end of store log"
            );
            backend.truncate(scan.valid_len)?;
        }

        let mut state = State {
            schema: Schema::default(),
            collections: BTreeMap::new(),
            backend,
            replayed_frames: scan.entries.len(),
            rollback_to: None,
        };
        for (offset, entry) in scan.entries {
            state.apply(offset, entry)?;
        }

        tracing::debug!(
            frames = state.replayed_frames,
            schema_version = state.schema.version,
            "store opened"
        );

        Ok(Self {
            state: RwLock::new(state),
            dir: None,
        })
    }

    /// Directory backing this store, if any.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(StoreDir::path)
    }

    /// Applies `schema` additively.
    ///
    /// Creates missing collections and indexes without touching existing
    /// data. Returns the applied plan; a second call with the same schema
    /// returns an empty plan and writes nothing.
    pub fn upgrade(&self, schema: &Schema) -> StoreResult<UpgradePlan> {
        let mut state = self.state.write();
        if schema.version < state.schema.version {
            return Err(StoreError::SchemaDowngrade {
                stored: state.schema.version,
                requested: schema.version,
            });
        }

        let plan = state.schema.plan_upgrade(schema);
        if plan.is_noop() {
            return Ok(plan);
        }

        let mut next = state.schema.clone();
        next.apply(&plan);
        state.log(&LogEntry::Schema(next))?;
        state.apply_plan(&plan);

        tracing::info!(
            from = plan.from_version,
            to = plan.to_version,
            steps = plan.steps.len(),
            "store schema upgraded"
        );
        Ok(plan)
    }

    /// The current schema.
    pub fn schema(&self) -> Schema {
        self.state.read().schema.clone()
    }

    /// The recorded schema version (0 for a fresh store).
    pub fn schema_version(&self) -> SchemaVersion {
        self.state.read().schema.version
    }

    /// Names of all collections.
    pub fn collections(&self) -> Vec<String> {
        self.state.read().collections.keys().cloned().collect()
    }

    /// Returns the record stored under `key`.
    pub fn get(&self, collection: &str, key: &str) -> StoreResult<Value> {
        let state = self.state.read();
        state
            .collection(collection)?
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::not_found(collection, key))
    }

    /// Returns every record of a collection in primary key order.
    pub fn get_all(&self, collection: &str) -> StoreResult<Vec<Value>> {
        let state = self.state.read();
        Ok(state
            .collection(collection)?
            .values()
            .map(|(_, v)| v.clone())
            .collect())
    }

    /// Primary keys of a collection in order.
    pub fn keys(&self, collection: &str) -> StoreResult<Vec<String>> {
        let state = self.state.read();
        Ok(state
            .collection(collection)?
            .values()
            .map(|(k, _)| k.clone())
            .collect())
    }

    /// Number of records in a collection.
    pub fn count(&self, collection: &str) -> StoreResult<usize> {
        Ok(self.state.read().collection(collection)?.len())
    }

    /// Inserts a new record; fails with `DuplicateKey` if the key exists.
    ///
    /// Returns the record's primary key.
    pub fn add(&self, collection: &str, record: Value) -> StoreResult<String> {
        let mut state = self.state.write();
        let target = state.collection(collection)?;
        let key = target.primary_key(&record)?;
        if target.contains(&key) {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                key,
            });
        }
        target.check_unique(&key, &record)?;

        state.log(&LogEntry::Put {
            collection: collection.to_string(),
            key: key.clone(),
            record: record.clone(),
        })?;
        state.collection_mut(collection)?.put(key.clone(), record);
        Ok(key)
    }

    /// Writes a record, replacing any existing record with the same key.
    ///
    /// Returns the record's primary key.
    pub fn update(&self, collection: &str, record: Value) -> StoreResult<String> {
        let mut state = self.state.write();
        let target = state.collection(collection)?;
        let key = target.primary_key(&record)?;
        target.check_unique(&key, &record)?;

        state.log(&LogEntry::Put {
            collection: collection.to_string(),
            key: key.clone(),
            record: record.clone(),
        })?;
        state.collection_mut(collection)?.put(key.clone(), record);
        Ok(key)
    }

    /// Deletes the record under `key`; fails with `NotFound` if absent.
    pub fn delete(&self, collection: &str, key: &str) -> StoreResult<()> {
        let mut state = self.state.write();
        if !state.collection(collection)?.contains(key) {
            return Err(StoreError::not_found(collection, key));
        }
        state.log(&LogEntry::Delete {
            collection: collection.to_string(),
            key: key.to_string(),
        })?;
        state.collection_mut(collection)?.remove(key);
        Ok(())
    }

    /// Removes every record of a collection.
    pub fn clear(&self, collection: &str) -> StoreResult<()> {
        let mut state = self.state.write();
        if state.collection(collection)?.is_empty() {
            return Ok(());
        }
        state.log(&LogEntry::Clear {
            collection: collection.to_string(),
        })?;
        state.collection_mut(collection)?.clear();
        Ok(())
    }

    /// Records whose `index` field equals `value`, in primary key order.
    pub fn get_by_index(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> StoreResult<Vec<Value>> {
        let state = self.state.read();
        let target = state.collection(collection)?;
        Ok(target
            .lookup(index, value)?
            .iter()
            .filter_map(|key| target.get(key).cloned())
            .collect())
    }

    /// First record whose `index` field equals `value`.
    pub fn get_one_by_index(
        &self,
        collection: &str,
        index: &str,
        value: &Value,
    ) -> StoreResult<Option<Value>> {
        Ok(self
            .get_by_index(collection, index, value)?
            .into_iter()
            .next())
    }

    /// Rewrites the log as a snapshot of live state.
    pub fn compact(&self) -> StoreResult<CompactionStats> {
        let mut state = self.state.write();
        let before = state.backend.size()?;

        let mut snapshot = frame::encode_frame(&LogEntry::Schema(state.schema.clone()))?;
        for (name, collection) in &state.collections {
            for (key, record) in collection.values() {
                snapshot.extend(frame::encode_frame(&LogEntry::Put {
                    collection: name.clone(),
                    key: key.clone(),
                    record: record.clone(),
                })?);
            }
        }
        state.backend.replace(&snapshot)?;
        state.rollback_to = None;

        let after = state.backend.size()?;
        tracing::info!(before, after, "store log compacted");
        Ok(CompactionStats { before, after })
    }

    /// Current counters.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let state = self.state.read();
        Ok(StoreStats {
            schema_version: state.schema.version,
            collections: state
                .collections
                .iter()
                .map(|(name, c)| (name.clone(), c.len()))
                .collect(),
            log_size: state.backend.size()?,
            replayed_frames: state.replayed_frames,
        })
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("LocalStore")
            .field("path", &self.path())
            .field("schema_version", &state.schema.version)
            .field("collections", &state.collections.len())
            .finish()
    }
}
