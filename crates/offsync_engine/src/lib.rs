//! # offsync engine
//!
//! Offline-first request handling for a REST backend.
//!
//! This crate provides:
//! - A response cache serving last-known-good reads while offline
//! - A durable mutation queue for writes made while offline
//! - A sync engine replaying queued writes in enqueue order
//! - A connectivity monitor that triggers replay on reconnect and on a timer
//! - A gateway that decides per request between network, cache and queue
//! - Token refresh on 401 shared by live and replayed requests
//!
//! ## Architecture
//!
//! ```text
//! application -> Gateway -> ApiClient -> Transport -> backend services
//!                  |   \
//!           ResponseCache  MutationQueue <- SyncEngine <- ConnectivityMonitor
//!                  \         /
//!                  LocalStore
//! ```
//!
//! ## Key Invariants
//!
//! - Queued mutations are replayed in enqueue order, one drain at a time
//! - Every status change is persisted before the next network call
//! - A mutation fails terminally after `max_retries` failed attempts
//! - A 401 triggers at most one refresh and one retry

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod client;
mod config;
mod connectivity;
mod credentials;
mod diagnostics;
mod engine;
mod error;
mod gateway;
mod http;
mod mutation;
mod offline;
mod queue;
mod routing;
mod transport;
mod types;

pub use cache::{CacheEntry, ResponseCache};
pub use client::{ApiClient, REFRESH_ENDPOINT};
pub use config::{SyncConfig, DEFAULT_BACKGROUND_TAG, DEFAULT_SUPPORTED_ENDPOINTS};
pub use connectivity::{AutoSync, ConnectivityMonitor};
pub use credentials::{CredentialStore, TokenSet};
pub use diagnostics::{Component, Diagnostic, DiagnosticsSink, TracingSink};
pub use engine::{BackgroundScheduler, DrainReport, SyncEngine, SyncStats};
pub use error::{Disposition, SyncError, SyncResult};
pub use gateway::{offline_marker, Gateway, GatewayResponse};
pub use http::HttpTransport;
pub use mutation::{
    EntityKind, MutationPayload, MutationRequest, MutationStatus, MutationTarget, OperationType,
    QueuedMutation,
};
pub use offline::OfflineClient;
pub use queue::MutationQueue;
pub use routing::{endpoint_path, route, Router, Service};
pub use transport::{MockTransport, Transport};
pub use types::{now_millis, Headers, HttpMethod, HttpRequest, HttpResponse, LogicalRequest};
