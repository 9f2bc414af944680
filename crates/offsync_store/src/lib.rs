//! # offsync store
//!
//! Durable, indexed, versioned key-value storage with named collections.
//!
//! This crate is the lowest layer of the offline sync engine. It knows
//! nothing about HTTP, queues or caches: it stores JSON records in named
//! collections, keeps secondary indexes, and persists every mutating call
//! as one checksummed frame in an append-only log.
//!
//! ## Guarantees
//!
//! - Each call is atomic and durable on return (one frame, synced)
//! - There is no atomicity across calls or collections
//! - A torn trailing frame from a crash is discarded on open
//! - Schema upgrades are additive and idempotent
//!
//! ## Backends
//!
//! - [`FileBackend`] - a single log file inside a locked [`StoreDir`]
//! - [`MemoryBackend`] - for tests and ephemeral stores

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod collection;
mod dir;
mod error;
mod file;
mod frame;
mod index;
mod memory;
mod schema;
mod store;

pub use backend::LogBackend;
pub use dir::{StoreDir, APP_DIR};
pub use error::{StoreError, StoreResult};
pub use file::FileBackend;
pub use frame::{crc32, LogEntry, FRAME_MAGIC, FRAME_VERSION};
pub use index::index_key;
pub use memory::MemoryBackend;
pub use schema::{
    app_schema, CollectionSpec, IndexSpec, Schema, SchemaVersion, UpgradePlan, UpgradeStep,
    APP_SCHEMA_VERSION, CREDENTIALS, RESPONSE_CACHE, SYNC_QUEUE,
};
pub use store::{CompactionStats, LocalStore, StoreStats};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
