//! Sink for internal failures that are absorbed instead of returned.

use crate::error::{Disposition, SyncError};
use crate::types::now_millis;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;

/// Component that absorbed an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    /// Response cache writes.
    Cache,
    /// Mutation queue bookkeeping.
    Queue,
    /// Background drains.
    Sync,
    /// Host background scheduler registration.
    Background,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Cache => "cache",
            Self::Queue => "queue",
            Self::Sync => "sync",
            Self::Background => "background",
        })
    }
}

/// One absorbed failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Where it happened.
    pub component: Component,
    /// Policy classification of the error.
    pub disposition: Disposition,
    /// Error message.
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub at: u64,
}

/// Receives failures that never reach the caller.
pub trait DiagnosticsSink: Send + Sync {
    /// Records `error` raised inside `component`.
    fn report(&self, component: Component, error: &SyncError);
}

/// Default sink: logs through `tracing` and keeps the most recent entries.
#[derive(Debug)]
pub struct TracingSink {
    capacity: usize,
    history: Mutex<VecDeque<Diagnostic>>,
}

impl TracingSink {
    /// Keeps at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            history: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Recorded entries, oldest first.
    pub fn recent(&self) -> Vec<Diagnostic> {
        self.history.lock().iter().cloned().collect()
    }

    /// Entries recorded for `component`.
    pub fn for_component(&self, component: Component) -> Vec<Diagnostic> {
        self.history
            .lock()
            .iter()
            .filter(|d| d.component == component)
            .cloned()
            .collect()
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(128)
    }
}

impl DiagnosticsSink for TracingSink {
    fn report(&self, component: Component, error: &SyncError) {
        let disposition = error.disposition();
        match disposition {
            Disposition::Fatal => {
                tracing::error!(%component, error = %error, "internal failure")
            }
            _ => tracing::warn!(%component, error = %error, "internal failure absorbed"),
        }

        if self.capacity == 0 {
            return;
        }
        let mut history = self.history.lock();
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(Diagnostic {
            component,
            disposition,
            message: error.to_string(),
            at: now_millis(),
        });
    }
}
