//! offsync CLI
//!
//! Command-line tools for an offsync store.
//!
//! # Commands
//!
//! - `inspect` - Display store statistics, queue and cache summary
//! - `queue` - List, requeue, recover or purge queued mutations
//! - `cache` - List or clear cached responses
//! - `compact` - Rewrite the store log as a snapshot
//! - `drain` - Replay pending mutations against the configured backend

mod commands;

use clap::{Parser, Subcommand};
use offsync_engine::SyncConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// offsync store maintenance tools.
#[derive(Parser)]
#[command(name = "offsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the store directory (defaults to the platform data directory)
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// YAML configuration file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display store statistics, queue and cache summary
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Inspect and maintain the mutation queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Inspect and maintain the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Rewrite the store log as a snapshot of live records
    Compact {
        /// Dry run - show what would be done
        #[arg(short, long)]
        dry_run: bool,
    },

    /// Replay pending mutations against the configured backend
    Drain,

    /// Show version information
    Version,
}

#[derive(Subcommand)]
enum QueueAction {
    /// List queued mutations in enqueue order
    List {
        /// Only show this status (pending, in_flight, completed, failed)
        #[arg(short, long)]
        status: Option<String>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Move a failed mutation back to pending
    Requeue {
        /// Mutation id
        id: String,
    },
    /// Reset mutations stuck in flight to pending
    Recover,
    /// Delete completed mutations
    Purge,
}

#[derive(Subcommand)]
enum CacheAction {
    /// List cached endpoints
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Remove one cached endpoint, or everything if none is given
    Clear {
        /// Endpoint key to remove
        endpoint: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => SyncConfig::from_yaml_file(path)?,
        None => SyncConfig::default(),
    };
    if let Some(path) = cli.path {
        config.store_path = Some(path);
    }

    match cli.command {
        Commands::Inspect { format } => commands::inspect::run(&config, &format)?,
        Commands::Queue { action } => match action {
            QueueAction::List { status, format } => {
                commands::queue::list(&config, status.as_deref(), &format)?
            }
            QueueAction::Requeue { id } => commands::queue::requeue(&config, &id)?,
            QueueAction::Recover => commands::queue::recover(&config)?,
            QueueAction::Purge => commands::queue::purge(&config)?,
        },
        Commands::Cache { action } => match action {
            CacheAction::List { format } => commands::cache::list(&config, &format)?,
            CacheAction::Clear { endpoint } => {
                commands::cache::clear(&config, endpoint.as_deref())?
            }
        },
        Commands::Compact { dry_run } => commands::compact::run(&config, dry_run)?,
        Commands::Drain => {
            if cli.config.is_none() {
                return Err("--config is required for drain".into());
            }
            commands::drain::run(&config)?;
        }
        Commands::Version => {
            println!("offsync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("offsync store v{}", offsync_store::VERSION);
        }
    }

    Ok(())
}
