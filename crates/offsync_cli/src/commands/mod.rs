//! CLI command implementations.

pub mod cache;
pub mod compact;
pub mod drain;
pub mod inspect;
pub mod queue;

use offsync_engine::SyncConfig;
use offsync_store::{app_schema, LocalStore};
use std::sync::Arc;

/// Error type shared by every command.
pub type CommandResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Opens the configured store and brings its schema up to date.
pub fn open_store(config: &SyncConfig) -> CommandResult<Arc<LocalStore>> {
    let store = match &config.store_path {
        Some(path) => {
            if !path.exists() {
                return Err(format!("No store found at {}", path.display()).into());
            }
            LocalStore::open(path)?
        }
        None => LocalStore::open_default()?,
    };
    store.upgrade(&app_schema())?;
    Ok(Arc::new(store))
}

/// Shortens `s` to at most `max` characters for table output.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_keeps_short_strings() {
        assert_eq!(truncate("/api/users", 20), "/api/users");
        assert_eq!(truncate("/api/products?page=12", 8), "/api/pr…");
    }

    #[test]
    fn missing_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig::default().with_store_path(dir.path().join("absent"));
        assert!(open_store(&config).is_err());
    }
}
