//! Error types for the local store.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in local store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No persistent-storage host is available (no data directory, or it
    /// cannot be created).
    #[error("persistent storage unavailable: {reason}")]
    EnvironmentUnavailable {
        /// Why the environment cannot host a store.
        reason: String,
    },

    /// Record not found.
    #[error("record not found: {key:?} in collection {collection}")]
    NotFound {
        /// The collection searched.
        collection: String,
        /// The primary key that was not found.
        key: String,
    },

    /// A record with the same primary key already exists.
    #[error("duplicate key: {key:?} already exists in collection {collection}")]
    DuplicateKey {
        /// The collection written to.
        collection: String,
        /// The conflicting primary key.
        key: String,
    },

    /// A unique secondary index already holds the value.
    #[error("unique index {index} on {collection} already contains {value}")]
    UniqueViolation {
        /// The collection written to.
        collection: String,
        /// The violated index.
        index: String,
        /// The duplicated indexed value.
        value: String,
    },

    /// The collection is not declared in the schema.
    #[error("unknown collection: {name}")]
    UnknownCollection {
        /// Name of the collection.
        name: String,
    },

    /// The index is not declared on the collection.
    #[error("unknown index {index} on collection {collection}")]
    UnknownIndex {
        /// Name of the collection.
        collection: String,
        /// Name of the index.
        index: String,
    },

    /// The record is not an object or lacks a usable primary key.
    #[error("invalid record for collection {collection}: {message}")]
    InvalidRecord {
        /// Name of the collection.
        collection: String,
        /// What is wrong with the record.
        message: String,
    },

    /// A schema with a lower version than the stored one was supplied.
    #[error("schema downgrade from version {stored} to {requested} is not supported")]
    SchemaDowngrade {
        /// Version already recorded in the store.
        stored: u32,
        /// Version that was requested.
        requested: u32,
    },

    /// The store directory is locked by another process.
    #[error("store locked: another process has exclusive access")]
    Locked,

    /// The log is corrupted.
    #[error("store log corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Offset of the bad frame.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Frame payload encoding or decoding failed.
    #[error("codec error: {0}")]
    Codec(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StoreError {
    /// Creates an environment-unavailable error.
    pub fn environment_unavailable(reason: impl Into<String>) -> Self {
        Self::EnvironmentUnavailable {
            reason: reason.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(collection: &str, key: impl Into<String>) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            key: key.into(),
        }
    }

    /// Creates an unknown-collection error.
    pub fn unknown_collection(name: &str) -> Self {
        Self::UnknownCollection {
            name: name.to_string(),
        }
    }

    /// Creates an invalid-record error.
    pub fn invalid_record(collection: &str, message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            collection: collection.to_string(),
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }

    /// Returns true if this is a `NotFound` error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if this is a `DuplicateKey` error.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, Self::DuplicateKey { .. })
    }
}
