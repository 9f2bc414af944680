//! Queue command implementations.

use super::{open_store, truncate, CommandResult};
use offsync_engine::{MutationQueue, MutationStatus, QueuedMutation, SyncConfig};
use offsync_store::SYNC_QUEUE;
use serde_json::json;

fn open_queue(config: &SyncConfig) -> CommandResult<MutationQueue> {
    Ok(MutationQueue::new(open_store(config)?, config.max_retries)?)
}

/// Lists mutations, optionally filtered by status.
pub fn list(config: &SyncConfig, status: Option<&str>, format: &str) -> CommandResult {
    let queue = open_queue(config)?;
    let mutations = match status {
        Some(status) => queue.list_by_status(status.parse::<MutationStatus>()?)?,
        None => queue.list_all()?,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&mutations)?),
        _ => print_table(&mutations),
    }
    Ok(())
}

fn print_table(mutations: &[QueuedMutation]) {
    if mutations.is_empty() {
        println!("Queue is empty");
        return;
    }
    println!(
        "{:<36}  {:<10}  {:<7}  {:<9}  {:>8}  {}",
        "ID", "STATUS", "METHOD", "ENTITY", "ATTEMPTS", "URL"
    );
    for m in mutations {
        println!(
            "{:<36}  {:<10}  {:<7}  {:<9}  {:>8}  {}",
            m.id,
            m.status,
            m.payload.method,
            m.entity_kind,
            m.attempt_count,
            truncate(&m.payload.url, 48)
        );
        if let Some(error) = &m.last_error {
            println!("    last error: {}", truncate(error, 100));
        }
    }
}

/// Moves a failed mutation back to pending.
pub fn requeue(config: &SyncConfig, id: &str) -> CommandResult {
    let mutation = open_queue(config)?.requeue(id)?;
    println!(
        "Requeued {} ({} previous attempts)",
        mutation.id, mutation.attempt_count
    );
    Ok(())
}

/// Resets mutations stuck in flight to pending.
pub fn recover(config: &SyncConfig) -> CommandResult {
    let store = open_store(config)?;
    let stuck = store
        .get_by_index(SYNC_QUEUE, "by_status", &json!(MutationStatus::InFlight.as_str()))?
        .len();
    // Construction performs the reset.
    MutationQueue::new(store, config.max_retries)?;
    println!("Recovered {stuck} in-flight mutation(s)");
    Ok(())
}

/// Deletes completed mutations.
pub fn purge(config: &SyncConfig) -> CommandResult {
    let purged = open_queue(config)?.purge_completed()?;
    println!("Purged {purged} completed mutation(s)");
    Ok(())
}
