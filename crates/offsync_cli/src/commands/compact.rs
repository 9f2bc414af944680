//! Compact command implementation.

use super::{open_store, CommandResult};
use offsync_engine::SyncConfig;

/// Runs the compact command.
pub fn run(config: &SyncConfig, dry_run: bool) -> CommandResult {
    let store = open_store(config)?;
    let stats = store.stats()?;
    let records: usize = stats.collections.values().sum();

    println!("Compacting store log");
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();
    println!("  Live records:    {records}");
    println!("  Replayed frames: {}", stats.replayed_frames);
    println!("  Size before:     {} bytes", stats.log_size);

    if dry_run {
        return Ok(());
    }

    let result = store.compact()?;
    let saved = result.before.saturating_sub(result.after);
    println!("  Size after:      {} bytes", result.after);
    println!(
        "  Space saved:     {} bytes ({:.1}%)",
        saved,
        if result.before > 0 {
            saved as f64 / result.before as f64 * 100.0
        } else {
            0.0
        }
    );
    Ok(())
}
