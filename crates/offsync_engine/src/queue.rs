//! Durable queue of pending writes.

use crate::error::{SyncError, SyncResult};
use crate::mutation::{MutationRequest, MutationStatus, QueuedMutation};
use crate::types::{now_millis, AUTHORIZATION};
use offsync_store::{LocalStore, SYNC_QUEUE};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Mutation queue over the `sync_queue` collection.
///
/// Every transition is persisted before it returns, so a restart resumes
/// from the last recorded status. Entries left `in_flight` by a crash are
/// reset to `pending` when the queue is constructed.
#[derive(Debug)]
pub struct MutationQueue {
    store: Arc<LocalStore>,
    max_retries: u32,
    next_sequence: AtomicU64,
    // Serializes read-modify-write transitions.
    transitions: Mutex<()>,
}

impl MutationQueue {
    /// Opens the queue and recovers interrupted mutations.
    pub fn new(store: Arc<LocalStore>, max_retries: u32) -> SyncResult<Self> {
        let next = store
            .get_all(SYNC_QUEUE)?
            .iter()
            .filter_map(|r| r.get("sequence").and_then(Value::as_u64))
            .max()
            .map_or(0, |s| s + 1);

        let queue = Self {
            store,
            max_retries,
            next_sequence: AtomicU64::new(next),
            transitions: Mutex::new(()),
        };
        let recovered = queue.recover_in_flight()?;
        if recovered > 0 {
            tracing::info!(recovered, "reset interrupted mutations to pending");
        }
        Ok(queue)
    }

    /// Failed attempts before a mutation becomes terminal.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Appends a mutation with status `pending` and returns it.
    pub fn enqueue(&self, request: MutationRequest) -> SyncResult<QueuedMutation> {
        let mut payload = request.payload;
        payload
            .headers
            .retain(|name, _| !name.eq_ignore_ascii_case(AUTHORIZATION));

        let now = now_millis();
        let mutation = QueuedMutation {
            id: uuid::Uuid::new_v4().to_string(),
            operation_type: request.operation_type,
            entity_kind: request.target.entity_kind,
            entity_id: request.target.entity_id,
            payload,
            enqueued_at: now,
            sequence: self.next_sequence.fetch_add(1, Ordering::SeqCst),
            attempt_count: 0,
            status: MutationStatus::Pending,
            last_error: None,
            updated_at: now,
        };

        self.store.add(SYNC_QUEUE, encode(&mutation)?)?;
        tracing::info!(
            id = %mutation.id,
            operation = ?mutation.operation_type,
            entity = %mutation.entity_kind,
            url = %mutation.payload.url,
            "mutation queued"
        );
        Ok(mutation)
    }

    /// One mutation by id.
    pub fn get(&self, id: &str) -> SyncResult<QueuedMutation> {
        match self.store.get(SYNC_QUEUE, id) {
            Ok(record) => decode(record),
            Err(e) if e.is_not_found() => Err(SyncError::MutationNotFound { id: id.to_string() }),
            Err(e) => Err(e.into()),
        }
    }

    /// Every mutation, in enqueue order.
    pub fn list_all(&self) -> SyncResult<Vec<QueuedMutation>> {
        let mut all = self
            .store
            .get_all(SYNC_QUEUE)?
            .into_iter()
            .map(decode)
            .collect::<SyncResult<Vec<_>>>()?;
        all.sort_by_key(QueuedMutation::order_key);
        Ok(all)
    }

    /// Mutations with `status`, in enqueue order.
    pub fn list_by_status(&self, status: MutationStatus) -> SyncResult<Vec<QueuedMutation>> {
        let mut matching = self
            .store
            .get_by_index(SYNC_QUEUE, "by_status", &json!(status.as_str()))?
            .into_iter()
            .map(decode)
            .collect::<SyncResult<Vec<_>>>()?;
        matching.sort_by_key(QueuedMutation::order_key);
        Ok(matching)
    }

    /// `pending` and `failed` mutations, in enqueue order.
    pub fn list_pending(&self) -> SyncResult<Vec<QueuedMutation>> {
        let mut pending = self.list_by_status(MutationStatus::Pending)?;
        pending.extend(self.list_by_status(MutationStatus::Failed)?);
        pending.sort_by_key(QueuedMutation::order_key);
        Ok(pending)
    }

    /// Mutations a drain would attempt, in enqueue order.
    pub fn list_eligible(&self) -> SyncResult<Vec<QueuedMutation>> {
        Ok(self
            .list_pending()?
            .into_iter()
            .filter(|m| m.is_eligible(self.max_retries))
            .collect())
    }

    /// Number of mutations with `status`.
    pub fn count(&self, status: MutationStatus) -> SyncResult<usize> {
        Ok(self
            .store
            .get_by_index(SYNC_QUEUE, "by_status", &json!(status.as_str()))?
            .len())
    }

    fn transition<F>(&self, id: &str, to: MutationStatus, apply: F) -> SyncResult<QueuedMutation>
    where
        F: FnOnce(&mut QueuedMutation),
    {
        let _guard = self.transitions.lock();
        let mut mutation = self.get(id)?;
        if !mutation.status.can_transition_to(to) {
            return Err(SyncError::InvalidTransition {
                id: id.to_string(),
                from: mutation.status,
                to,
            });
        }
        mutation.status = to;
        mutation.updated_at = now_millis();
        apply(&mut mutation);
        self.store.update(SYNC_QUEUE, encode(&mutation)?)?;
        Ok(mutation)
    }

    /// `pending|failed -> in_flight`.
    pub fn mark_in_flight(&self, id: &str) -> SyncResult<QueuedMutation> {
        self.transition(id, MutationStatus::InFlight, |_| {})
    }

    /// `in_flight -> completed`.
    pub fn mark_completed(&self, id: &str) -> SyncResult<QueuedMutation> {
        let mutation = self.transition(id, MutationStatus::Completed, |m| m.last_error = None)?;
        tracing::debug!(id, "mutation completed");
        Ok(mutation)
    }

    /// `in_flight -> pending` or, once the retry limit is reached, `failed`.
    pub fn record_failure(&self, id: &str, error: &str) -> SyncResult<QueuedMutation> {
        let _guard = self.transitions.lock();
        let mut mutation = self.get(id)?;
        if mutation.status != MutationStatus::InFlight {
            return Err(SyncError::InvalidTransition {
                id: id.to_string(),
                from: mutation.status,
                to: MutationStatus::Pending,
            });
        }

        mutation.attempt_count += 1;
        mutation.status = if mutation.attempt_count >= self.max_retries {
            MutationStatus::Failed
        } else {
            MutationStatus::Pending
        };
        mutation.last_error = Some(error.to_string());
        mutation.updated_at = now_millis();
        self.store.update(SYNC_QUEUE, encode(&mutation)?)?;

        tracing::debug!(
            id,
            attempts = mutation.attempt_count,
            status = %mutation.status,
            error,
            "mutation attempt failed"
        );
        Ok(mutation)
    }

    /// Resets every `in_flight` mutation to `pending`. Returns how many.
    pub fn recover_in_flight(&self) -> SyncResult<usize> {
        let _guard = self.transitions.lock();
        let stuck = self
            .store
            .get_by_index(SYNC_QUEUE, "by_status", &json!(MutationStatus::InFlight.as_str()))?;
        let count = stuck.len();
        for record in stuck {
            let mut mutation = decode(record)?;
            mutation.status = MutationStatus::Pending;
            mutation.updated_at = now_millis();
            self.store.update(SYNC_QUEUE, encode(&mutation)?)?;
        }
        Ok(count)
    }

    /// Moves a `failed` mutation back to `pending` for manual retry.
    ///
    /// The attempt count is kept, so the mutation gets one more attempt
    /// before failing again.
    pub fn requeue(&self, id: &str) -> SyncResult<QueuedMutation> {
        let _guard = self.transitions.lock();
        let mut mutation = self.get(id)?;
        if mutation.status != MutationStatus::Failed {
            return Err(SyncError::InvalidTransition {
                id: id.to_string(),
                from: mutation.status,
                to: MutationStatus::Pending,
            });
        }
        mutation.status = MutationStatus::Pending;
        mutation.updated_at = now_millis();
        self.store.update(SYNC_QUEUE, encode(&mutation)?)?;
        tracing::info!(id, attempts = mutation.attempt_count, "mutation requeued");
        Ok(mutation)
    }

    /// Deletes `completed` mutations. `failed` ones are kept. Returns how many.
    pub fn purge_completed(&self) -> SyncResult<usize> {
        let _guard = self.transitions.lock();
        let done = self
            .store
            .get_by_index(SYNC_QUEUE, "by_status", &json!(MutationStatus::Completed.as_str()))?;
        for record in &done {
            let mutation = decode(record.clone())?;
            self.store.delete(SYNC_QUEUE, &mutation.id)?;
        }
        if !done.is_empty() {
            tracing::info!(purged = done.len(), "purged completed mutations");
        }
        Ok(done.len())
    }
}

fn encode(mutation: &QueuedMutation) -> SyncResult<Value> {
    serde_json::to_value(mutation).map_err(|e| SyncError::Codec(e.to_string()))
}

fn decode(record: Value) -> SyncResult<QueuedMutation> {
    serde_json::from_value(record).map_err(|e| SyncError::Codec(format!("queued mutation: {e}")))
}
