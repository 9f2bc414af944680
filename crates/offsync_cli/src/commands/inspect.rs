//! Inspect command implementation.

use super::{open_store, CommandResult};
use offsync_engine::{MutationStatus, ResponseCache, SyncConfig};
use offsync_store::SYNC_QUEUE;
use serde_json::json;
use serde::Serialize;
use std::collections::BTreeMap;

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store path.
    pub path: String,
    /// Schema version.
    pub schema_version: u32,
    /// Log size in bytes.
    pub log_size: u64,
    /// Frames replayed when the store was opened.
    pub replayed_frames: usize,
    /// Record count per collection.
    pub collections: BTreeMap<String, usize>,
    /// Mutation count per status.
    pub queue: BTreeMap<String, usize>,
    /// Cached endpoints.
    pub cached_endpoints: usize,
}

/// Runs the inspect command.
pub fn run(config: &SyncConfig, format: &str) -> CommandResult {
    let store = open_store(config)?;
    let stats = store.stats()?;
    let cache = ResponseCache::new(store.clone());

    let mut by_status = BTreeMap::new();
    for status in [
        MutationStatus::Pending,
        MutationStatus::InFlight,
        MutationStatus::Completed,
        MutationStatus::Failed,
    ] {
        // Read-only: a MutationQueue would reset in-flight entries on open.
        let count = store
            .get_by_index(SYNC_QUEUE, "by_status", &json!(status.as_str()))?
            .len();
        by_status.insert(status.to_string(), count);
    }

    let result = InspectResult {
        path: store
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default(),
        schema_version: stats.schema_version,
        log_size: stats.log_size,
        replayed_frames: stats.replayed_frames,
        collections: stats.collections,
        queue: by_status,
        cached_endpoints: cache.len()?,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => print_text_output(&result),
    }
    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("Store: {}", result.path);
    println!("  Schema version:  {}", result.schema_version);
    println!("  Log size:        {} bytes", result.log_size);
    println!("  Replayed frames: {}", result.replayed_frames);
    println!();
    println!("Collections:");
    for (name, count) in &result.collections {
        println!("  {name:<16} {count}");
    }
    println!();
    println!("Mutation queue:");
    for (status, count) in &result.queue {
        println!("  {status:<16} {count}");
    }
    println!();
    println!("Cached endpoints: {}", result.cached_endpoints);
}
