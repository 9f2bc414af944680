//! Cache command implementations.

use super::{open_store, truncate, CommandResult};
use offsync_engine::{now_millis, ResponseCache, SyncConfig};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct CachedEndpoint {
    endpoint_key: String,
    fetched_at: u64,
    age_secs: u64,
    payload_bytes: usize,
}

/// Lists cached endpoints.
pub fn list(config: &SyncConfig, format: &str) -> CommandResult {
    let cache = ResponseCache::new(open_store(config)?);
    let now = now_millis();
    let endpoints = cache
        .entries()?
        .into_iter()
        .map(|entry| CachedEndpoint {
            age_secs: entry.age_at(now).as_secs(),
            payload_bytes: entry.payload.to_string().len(),
            endpoint_key: entry.endpoint_key,
            fetched_at: entry.fetched_at,
        })
        .collect::<Vec<_>>();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&endpoints)?),
        _ => {
            if endpoints.is_empty() {
                println!("Cache is empty");
            }
            for e in &endpoints {
                println!(
                    "{:<48}  {:>8}s old  {:>8} bytes",
                    truncate(&e.endpoint_key, 48),
                    e.age_secs,
                    e.payload_bytes
                );
            }
        }
    }
    Ok(())
}

/// Removes one endpoint, or the whole cache.
pub fn clear(config: &SyncConfig, endpoint: Option<&str>) -> CommandResult {
    let cache = ResponseCache::new(open_store(config)?);
    match endpoint {
        Some(endpoint) => {
            if cache.remove(endpoint)? {
                println!("Removed {endpoint}");
            } else {
                println!("{endpoint} was not cached");
            }
        }
        None => {
            let count = cache.len()?;
            cache.clear()?;
            println!("Cleared {count} cached endpoint(s)");
        }
    }
    Ok(())
}
