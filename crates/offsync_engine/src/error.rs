//! Error types for the sync engine.

use crate::mutation::MutationStatus;
use offsync_store::StoreError;
use serde_json::Value;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in the cache, queue, gateway or sync engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Local store error. `EnvironmentUnavailable` arrives through here.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// No cached response exists for the endpoint.
    #[error("no cached response for {endpoint_key}")]
    CacheMiss {
        /// The cache key that missed.
        endpoint_key: String,
    },

    /// Offline and nothing cached for the endpoint.
    #[error("offline and nothing cached for {endpoint}")]
    NoConnectionNoCache {
        /// The requested endpoint.
        endpoint: String,
    },

    /// Token refresh failed or the backend still answered 401 afterwards.
    #[error("session expired: re-authentication required")]
    SessionExpired,

    /// A mutation failed too many times and is now terminal.
    #[error("mutation {mutation_id} failed after {attempts} attempts")]
    RetryExceeded {
        /// The mutation that gave up.
        mutation_id: String,
        /// How many attempts were made.
        attempts: u32,
    },

    /// Network-level failure before any HTTP response.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the request may succeed if repeated.
        retryable: bool,
    },

    /// The backend answered with a non-2xx status.
    #[error("backend returned HTTP {status}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        body: Value,
    },

    /// The request did not finish within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// A mutation status change not allowed by the transition table.
    #[error("invalid transition for mutation {id}: {from} -> {to}")]
    InvalidTransition {
        /// Mutation id.
        id: String,
        /// Current status.
        from: MutationStatus,
        /// Requested status.
        to: MutationStatus,
    },

    /// No queued mutation has this id.
    #[error("mutation not found: {id}")]
    MutationNotFound {
        /// The id looked up.
        id: String,
    },

    /// The host refused to register background sync. Foreground sync
    /// still works.
    #[error("background sync unavailable for {tag}: {reason}")]
    BackgroundUnavailable {
        /// Registration tag.
        tag: String,
        /// Reason given by the host.
        reason: String,
    },

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A stored or received value could not be decoded.
    #[error("codec error: {0}")]
    Codec(String),
}

/// How an error is treated when it reaches a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    /// Propagated to the caller; the user can act on it.
    UserFacing,
    /// The environment cannot host the engine at all.
    Fatal,
    /// Logged to the diagnostics sink and absorbed.
    Silent,
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// True if the same request may succeed later without any change:
    /// retryable transport failures, timeouts, 5xx, 408 and 429.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { retryable, .. } => *retryable,
            Self::Timeout => true,
            Self::Http { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            _ => false,
        }
    }

    /// True for failures below HTTP (no response was received).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout)
    }

    /// True if the store reported that no storage host exists.
    pub fn is_environment_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::EnvironmentUnavailable { .. })
        )
    }

    /// The policy table: which errors reach the user and which are absorbed.
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Store(StoreError::EnvironmentUnavailable { .. }) => Disposition::Fatal,
            Self::SessionExpired | Self::NoConnectionNoCache { .. } => Disposition::UserFacing,
            Self::Http { .. } if !self.is_transient() => Disposition::UserFacing,
            Self::Config(_) => Disposition::Fatal,
            _ => Disposition::Silent,
        }
    }
}
