//! Versioned store schema and additive upgrades.
//!
//! A [`Schema`] names every collection, its primary key field and its
//! secondary indexes. Upgrades are forward-only and additive: missing
//! collections and indexes are created, nothing existing is dropped or
//! rewritten. Applying the same schema twice changes nothing.

use serde::{Deserialize, Serialize};

/// Schema version number.
pub type SchemaVersion = u32;

/// A secondary index declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    /// Index name, unique within its collection.
    pub name: String,
    /// Top-level record field the index is keyed on.
    pub key_path: String,
    /// Whether two records may share an indexed value.
    pub unique: bool,
}

impl IndexSpec {
    /// A non-unique index on `key_path`.
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            unique: false,
        }
    }

    /// A unique index on `key_path`.
    pub fn unique(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            unique: true,
            ..Self::new(name, key_path)
        }
    }
}

/// A collection declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionSpec {
    /// Collection name.
    pub name: String,
    /// Top-level record field holding the primary key.
    pub key_path: String,
    /// Secondary indexes.
    pub indexes: Vec<IndexSpec>,
}

impl CollectionSpec {
    /// A collection keyed on `key_path` with no indexes.
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            indexes: Vec::new(),
        }
    }

    /// Adds an index declaration.
    #[must_use]
    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// Looks up an index by name.
    pub fn index(&self, name: &str) -> Option<&IndexSpec> {
        self.indexes.iter().find(|i| i.name == name)
    }
}

/// A full schema at a given version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Version number; upgrades only move forward.
    pub version: SchemaVersion,
    /// Declared collections.
    pub collections: Vec<CollectionSpec>,
}

impl Schema {
    /// An empty schema at `version`.
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            version,
            collections: Vec::new(),
        }
    }

    /// Adds a collection declaration.
    #[must_use]
    pub fn with_collection(mut self, collection: CollectionSpec) -> Self {
        self.collections.push(collection);
        self
    }

    /// Looks up a collection by name.
    pub fn collection(&self, name: &str) -> Option<&CollectionSpec> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Computes what applying `target` on top of `self` would add.
    ///
    /// Existing collections keep their key path even if `target` declares a
    /// different one: changing a primary key is not an additive change.
    pub fn plan_upgrade(&self, target: &Schema) -> UpgradePlan {
        let mut plan = UpgradePlan {
            from_version: self.version,
            to_version: self.version.max(target.version),
            steps: Vec::new(),
        };

        for wanted in &target.collections {
            match self.collection(&wanted.name) {
                None => plan.steps.push(UpgradeStep::CreateCollection {
                    collection: wanted.clone(),
                }),
                Some(existing) => {
                    for index in &wanted.indexes {
                        if existing.index(&index.name).is_none() {
                            plan.steps.push(UpgradeStep::CreateIndex {
                                collection: wanted.name.clone(),
                                index: index.clone(),
                            });
                        }
                    }
                }
            }
        }

        plan
    }

    /// Applies a plan produced by [`Schema::plan_upgrade`].
    pub fn apply(&mut self, plan: &UpgradePlan) {
        for step in &plan.steps {
            match step {
                UpgradeStep::CreateCollection { collection } => {
                    if self.collection(&collection.name).is_none() {
                        self.collections.push(collection.clone());
                    }
                }
                UpgradeStep::CreateIndex { collection, index } => {
                    if let Some(spec) = self.collections.iter_mut().find(|c| &c.name == collection) {
                        if spec.index(&index.name).is_none() {
                            spec.indexes.push(index.clone());
                        }
                    }
                }
            }
        }
        self.version = plan.to_version;
    }
}

/// One additive schema change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeStep {
    /// A collection that did not exist.
    CreateCollection {
        /// Its declaration.
        collection: CollectionSpec,
    },
    /// An index missing from an existing collection.
    CreateIndex {
        /// Owning collection.
        collection: String,
        /// The index declaration.
        index: IndexSpec,
    },
}

/// The additive changes between two schemas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePlan {
    /// Version before the upgrade.
    pub from_version: SchemaVersion,
    /// Version after the upgrade.
    pub to_version: SchemaVersion,
    /// Changes to apply, in order.
    pub steps: Vec<UpgradeStep>,
}

impl UpgradePlan {
    /// True if applying the plan would change nothing.
    pub fn is_noop(&self) -> bool {
        self.steps.is_empty() && self.from_version == self.to_version
    }
}

/// Collection holding queued mutations.
pub const SYNC_QUEUE: &str = "sync_queue";
/// Collection holding the last successful read per endpoint.
pub const RESPONSE_CACHE: &str = "response_cache";
/// Collection holding auth tokens under fixed keys.
pub const CREDENTIALS: &str = "credentials";

/// Current application schema version.
pub const APP_SCHEMA_VERSION: SchemaVersion = 3;

/// The application's collections.
///
/// Version history: 1 added the business collections, 2 added the sync queue
/// and response cache, 3 added the credentials collection and the queue's
/// `entity_kind` index.
pub fn app_schema() -> Schema {
    let business = [
        ("orders", "id"),
        ("categories", "id"),
        ("products", "id"),
        ("clients", "id"),
        ("providers", "id"),
        ("stores", "id"),
        ("users", "id"),
        ("vendors", "id"),
        ("exchange_rates", "currency"),
    ];

    let mut schema = Schema::new(APP_SCHEMA_VERSION);
    for (name, key) in business {
        let spec = CollectionSpec::new(name, key);
        let spec = match name {
            "orders" => spec
                .with_index(IndexSpec::new("by_client", "clientId"))
                .with_index(IndexSpec::new("by_store", "storeId")),
            "products" => spec
                .with_index(IndexSpec::new("by_category", "categoryId"))
                .with_index(IndexSpec::new("by_provider", "providerId")),
            "users" => spec.with_index(IndexSpec::unique("by_email", "email")),
            _ => spec,
        };
        schema = schema.with_collection(spec);
    }

    schema
        .with_collection(
            CollectionSpec::new(SYNC_QUEUE, "id")
                .with_index(IndexSpec::new("by_status", "status"))
                .with_index(IndexSpec::new("by_entity_kind", "entity_kind"))
                .with_index(IndexSpec::new("by_enqueued_at", "enqueued_at")),
        )
        .with_collection(
            CollectionSpec::new(RESPONSE_CACHE, "endpoint_key")
                .with_index(IndexSpec::new("by_fetched_at", "fetched_at")),
        )
        .with_collection(CollectionSpec::new(CREDENTIALS, "key"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upgrade_from_empty_creates_everything() {
        let target = app_schema();
        let plan = Schema::default().plan_upgrade(&target);
        assert_eq!(plan.steps.len(), target.collections.len());
        assert_eq!(plan.to_version, APP_SCHEMA_VERSION);

        let mut current = Schema::default();
        current.apply(&plan);
        assert_eq!(current, target);
    }

    #[test]
    fn upgrade_twice_is_noop() {
        let target = app_schema();
        let mut current = Schema::default();
        current.apply(&current.plan_upgrade(&target));

        let second = current.plan_upgrade(&target);
        assert!(second.is_noop());
    }

    #[test]
    fn upgrade_adds_only_missing_index() {
        let v1 = Schema::new(1).with_collection(CollectionSpec::new(SYNC_QUEUE, "id"));
        let v2 = Schema::new(2).with_collection(
            CollectionSpec::new(SYNC_QUEUE, "id").with_index(IndexSpec::new("by_status", "status")),
        );

        let plan = v1.plan_upgrade(&v2);
        assert_eq!(
            plan.steps,
            vec![UpgradeStep::CreateIndex {
                collection: SYNC_QUEUE.into(),
                index: IndexSpec::new("by_status", "status"),
            }]
        );
    }

    #[test]
    fn key_path_of_existing_collection_is_kept() {
        let mut current = Schema::new(1).with_collection(CollectionSpec::new("users", "id"));
        let target = Schema::new(2).with_collection(CollectionSpec::new("users", "email"));
        current.apply(&current.plan_upgrade(&target));

        assert_eq!(current.collection("users").unwrap().key_path, "id");
        assert_eq!(current.version, 2);
    }
}
