//! Last-known-good responses, keyed by endpoint.

use crate::error::{SyncError, SyncResult};
use crate::types::now_millis;
use offsync_store::{LocalStore, RESPONSE_CACHE};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// A cached response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The request path the body was fetched from, including any query.
    pub endpoint_key: String,
    /// Response body as received.
    pub payload: Value,
    /// Fetch time, milliseconds since the Unix epoch.
    pub fetched_at: u64,
}

impl CacheEntry {
    /// Age relative to `now` (milliseconds since the epoch).
    pub fn age_at(&self, now: u64) -> Duration {
        Duration::from_millis(now.saturating_sub(self.fetched_at))
    }
}

/// Response cache over the `response_cache` collection.
///
/// At most one entry per endpoint key; `put` overwrites. There is no TTL:
/// entries stay until overwritten or cleared.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    store: Arc<LocalStore>,
}

impl ResponseCache {
    /// Creates a cache over `store`.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    /// Stores `payload` for `endpoint_key`, replacing any previous entry.
    ///
    /// Tries an insert first and overwrites on a duplicate key, so no
    /// existence check is needed.
    pub fn put(&self, endpoint_key: &str, payload: Value) -> SyncResult<CacheEntry> {
        let entry = CacheEntry {
            endpoint_key: endpoint_key.to_string(),
            payload,
            fetched_at: now_millis(),
        };
        let record = serde_json::to_value(&entry).map_err(|e| SyncError::Codec(e.to_string()))?;
        match self.store.add(RESPONSE_CACHE, record.clone()) {
            Ok(_) => {}
            Err(e) if e.is_duplicate_key() => {
                self.store.update(RESPONSE_CACHE, record)?;
            }
            Err(e) => return Err(e.into()),
        }
        tracing::trace!(endpoint_key, "cached response");
        Ok(entry)
    }

    /// The entry for `endpoint_key`, or [`SyncError::CacheMiss`].
    pub fn get(&self, endpoint_key: &str) -> SyncResult<CacheEntry> {
        match self.store.get(RESPONSE_CACHE, endpoint_key) {
            Ok(record) => decode(record),
            Err(e) if e.is_not_found() => Err(SyncError::CacheMiss {
                endpoint_key: endpoint_key.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// The entry for `endpoint_key` if it is younger than `max_age`.
    pub fn get_fresh(&self, endpoint_key: &str, max_age: Duration) -> SyncResult<CacheEntry> {
        let entry = self.get(endpoint_key)?;
        if entry.age_at(now_millis()) > max_age {
            return Err(SyncError::CacheMiss {
                endpoint_key: endpoint_key.to_string(),
            });
        }
        Ok(entry)
    }

    /// Removes one entry. Returns whether it existed.
    pub fn remove(&self, endpoint_key: &str) -> SyncResult<bool> {
        match self.store.delete(RESPONSE_CACHE, endpoint_key) {
            Ok(()) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Removes every entry.
    pub fn clear(&self) -> SyncResult<()> {
        self.store.clear(RESPONSE_CACHE)?;
        Ok(())
    }

    /// Number of entries.
    pub fn len(&self) -> SyncResult<usize> {
        Ok(self.store.count(RESPONSE_CACHE)?)
    }

    /// True if the cache holds nothing.
    pub fn is_empty(&self) -> SyncResult<bool> {
        Ok(self.len()? == 0)
    }

    /// All entries, ordered by endpoint key.
    pub fn entries(&self) -> SyncResult<Vec<CacheEntry>> {
        self.store
            .get_all(RESPONSE_CACHE)?
            .into_iter()
            .map(decode)
            .collect()
    }
}

fn decode(record: Value) -> SyncResult<CacheEntry> {
    serde_json::from_value(record).map_err(|e| SyncError::Codec(format!("cache entry: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use offsync_store::app_schema;
    use serde_json::json;

    fn cache() -> ResponseCache {
        let store = LocalStore::in_memory().unwrap();
        store.upgrade(&app_schema()).unwrap();
        ResponseCache::new(Arc::new(store))
    }

    #[test]
    fn miss_then_hit() {
        let cache = cache();
        assert!(matches!(
            cache.get("/api/categories"),
            Err(SyncError::CacheMiss { .. })
        ));

        cache.put("/api/categories", json!([{"id": 1}])).unwrap();
        assert_eq!(
            cache.get("/api/categories").unwrap().payload,
            json!([{"id": 1}])
        );
    }

    #[test]
    fn put_overwrites() {
        let cache = cache();
        cache.put("/api/products", json!([1])).unwrap();
        cache.put("/api/products", json!([1, 2])).unwrap();
        assert_eq!(cache.len().unwrap(), 1);
        assert_eq!(cache.get("/api/products").unwrap().payload, json!([1, 2]));
    }

    #[test]
    fn query_strings_are_distinct_keys() {
        let cache = cache();
        cache.put("/api/products?page=1", json!("a")).unwrap();
        cache.put("/api/products?page=2", json!("b")).unwrap();
        assert_eq!(cache.get("/api/products?page=2").unwrap().payload, "b");
        assert_eq!(cache.entries().unwrap().len(), 2);
    }

    #[test]
    fn freshness() {
        let cache = cache();
        cache.put("/api/users", json!([])).unwrap();
        assert!(cache
            .get_fresh("/api/users", Duration::from_secs(60))
            .is_ok());

        let entry = cache.get("/api/users").unwrap();
        assert_eq!(
            entry.age_at(entry.fetched_at + 5_000),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn remove_and_clear() {
        let cache = cache();
        cache.put("/api/a", json!(1)).unwrap();
        cache.put("/api/b", json!(2)).unwrap();
        assert!(cache.remove("/api/a").unwrap());
        assert!(!cache.remove("/api/a").unwrap());
        cache.clear().unwrap();
        assert!(cache.is_empty().unwrap());
    }
}
