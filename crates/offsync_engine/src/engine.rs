//! Replays queued mutations against the backend.

use crate::client::ApiClient;
use crate::connectivity::ConnectivityMonitor;
use crate::diagnostics::{Component, DiagnosticsSink};
use crate::error::{SyncError, SyncResult};
use crate::mutation::{MutationStatus, QueuedMutation};
use crate::queue::MutationQueue;
use crate::transport::Transport;
use crate::types::now_millis;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Outcome of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Mutations sent.
    pub attempted: usize,
    /// Accepted by the backend.
    pub completed: usize,
    /// Failed and left pending for a later drain.
    pub retried: usize,
    /// Failed and reached the retry limit.
    pub failed: usize,
    /// Skipped because the host was offline when the drain started.
    pub offline: bool,
    /// Skipped because another drain was running.
    pub busy: bool,
    /// Stopped before the end of the queue.
    pub interrupted: bool,
}

/// Cumulative counters since the engine was created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Drains that ran (not skipped).
    pub drains: u64,
    /// Mutations accepted by the backend.
    pub completed: u64,
    /// Failed attempts.
    pub failed_attempts: u64,
    /// Mutations that reached the retry limit.
    pub exhausted: u64,
    /// Finish time of the last drain that ran.
    pub last_drain_at: Option<u64>,
}

/// Host hook for background sync (e.g. a service worker `sync` event).
pub trait BackgroundScheduler: Send + Sync {
    /// Registers a background sync under `tag`.
    fn register(&self, tag: &str) -> Result<(), String>;
}

/// Clears the draining flag on drop, including on early return.
struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Drains the mutation queue in enqueue order.
///
/// At most one drain runs at a time; a concurrent call returns a report
/// with `busy` set and sends nothing.
pub struct SyncEngine<T: Transport> {
    client: Arc<ApiClient<T>>,
    queue: Arc<MutationQueue>,
    connectivity: ConnectivityMonitor,
    diagnostics: Arc<dyn DiagnosticsSink>,
    draining: AtomicBool,
    stats: RwLock<SyncStats>,
}

impl<T: Transport> SyncEngine<T> {
    /// Creates an engine.
    pub fn new(
        client: Arc<ApiClient<T>>,
        queue: Arc<MutationQueue>,
        connectivity: ConnectivityMonitor,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            client,
            queue,
            connectivity,
            diagnostics,
            draining: AtomicBool::new(false),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// True while a drain is running.
    pub fn is_draining(&self) -> bool {
        self.draining.load(Ordering::Acquire)
    }

    /// Cumulative counters.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// The queue this engine drains.
    pub fn queue(&self) -> &Arc<MutationQueue> {
        &self.queue
    }

    /// Replays every eligible mutation once, in enqueue order.
    ///
    /// Does nothing while offline. Individual failures do not stop the
    /// drain; losing connectivity or the session does.
    pub async fn drain(&self) -> SyncResult<DrainReport> {
        if !self.connectivity.is_online() {
            tracing::debug!("offline, drain skipped");
            return Ok(DrainReport {
                offline: true,
                ..DrainReport::default()
            });
        }

        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            tracing::debug!("drain already running");
            return Ok(DrainReport {
                busy: true,
                ..DrainReport::default()
            });
        };

        let mutations = self.queue.list_eligible()?;
        tracing::debug!(count = mutations.len(), "draining mutation queue");

        let mut report = DrainReport::default();
        for mutation in mutations {
            if !self.connectivity.is_online() {
                tracing::info!("connectivity lost, drain interrupted");
                report.interrupted = true;
                break;
            }

            match self.replay(&mutation).await {
                Ok(()) => {
                    report.attempted += 1;
                    report.completed += 1;
                }
                Err(Replay::Failed(updated)) => {
                    report.attempted += 1;
                    if updated.status == MutationStatus::Failed {
                        report.failed += 1;
                    } else {
                        report.retried += 1;
                    }
                }
                Err(Replay::SessionExpired) => {
                    report.attempted += 1;
                    report.retried += 1;
                    report.interrupted = true;
                    tracing::warn!("session expired, drain stopped");
                    break;
                }
                Err(Replay::Store(e)) => return Err(e),
            }
        }

        self.record(&report);
        if report.attempted > 0 {
            tracing::info!(
                completed = report.completed,
                retried = report.retried,
                failed = report.failed,
                "drain finished"
            );
        }
        Ok(report)
    }

    async fn replay(&self, mutation: &QueuedMutation) -> Result<(), Replay> {
        let id = mutation.id.as_str();
        self.queue.mark_in_flight(id).map_err(Replay::Store)?;

        let payload = &mutation.payload;
        let result = self
            .client
            .execute(
                payload.method,
                &payload.url,
                &payload.headers,
                payload.body.as_ref(),
            )
            .await;

        match result {
            Ok(_) => {
                self.queue.mark_completed(id).map_err(Replay::Store)?;
                Ok(())
            }
            Err(error) => {
                let updated = self
                    .queue
                    .record_failure(id, &error.to_string())
                    .map_err(Replay::Store)?;
                if updated.status == MutationStatus::Failed {
                    self.diagnostics.report(
                        Component::Sync,
                        &SyncError::RetryExceeded {
                            mutation_id: updated.id.clone(),
                            attempts: updated.attempt_count,
                        },
                    );
                }
                if matches!(error, SyncError::SessionExpired) {
                    Err(Replay::SessionExpired)
                } else {
                    Err(Replay::Failed(updated))
                }
            }
        }
    }

    fn record(&self, report: &DrainReport) {
        let mut stats = self.stats.write();
        stats.drains += 1;
        stats.completed += report.completed as u64;
        stats.failed_attempts += (report.retried + report.failed) as u64;
        stats.exhausted += report.failed as u64;
        stats.last_drain_at = Some(now_millis());
    }

    /// Registers background sync with the host. Failure is logged, not fatal.
    pub fn register_background(&self, scheduler: &dyn BackgroundScheduler, tag: &str) -> bool {
        match scheduler.register(tag) {
            Ok(()) => {
                tracing::debug!(tag, "background sync registered");
                true
            }
            Err(reason) => {
                self.diagnostics.report(
                    Component::Background,
                    &SyncError::BackgroundUnavailable {
                        tag: tag.to_string(),
                        reason,
                    },
                );
                false
            }
        }
    }

    /// Forwards an error from a background drain to the diagnostics sink.
    pub fn report_background_failure(&self, error: &SyncError) {
        self.diagnostics.report(Component::Sync, error);
    }
}

impl<T: Transport> std::fmt::Debug for SyncEngine<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("draining", &self.is_draining())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

enum Replay {
    Failed(QueuedMutation),
    SessionExpired,
    Store(SyncError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::credentials::CredentialStore;
    use crate::diagnostics::TracingSink;
    use crate::error::Disposition;
    use crate::mutation::{EntityKind, MutationPayload, MutationRequest, MutationTarget, OperationType};
    use crate::transport::MockTransport;
    use crate::types::{Headers, HttpMethod, HttpResponse};
    use offsync_store::{app_schema, LocalStore};
    use serde_json::json;

    struct Harness {
        mock: MockTransport,
        queue: Arc<MutationQueue>,
        connectivity: ConnectivityMonitor,
        sink: Arc<TracingSink>,
        engine: SyncEngine<MockTransport>,
    }

    fn harness() -> Harness {
        let store = LocalStore::in_memory().unwrap();
        store.upgrade(&app_schema()).unwrap();
        let store = Arc::new(store);
        let mock = MockTransport::new();
        let config = SyncConfig::default();
        let client = Arc::new(ApiClient::new(
            &config,
            mock.clone(),
            CredentialStore::new(store.clone()),
        ));
        let queue = Arc::new(MutationQueue::new(store, config.max_retries).unwrap());
        let connectivity = ConnectivityMonitor::new(true);
        let sink = Arc::new(TracingSink::default());
        let engine = SyncEngine::new(client, queue.clone(), connectivity.clone(), sink.clone());
        Harness {
            mock,
            queue,
            connectivity,
            sink,
            engine,
        }
    }

    fn enqueue(queue: &MutationQueue, id: &str) -> String {
        queue
            .enqueue(MutationRequest {
                operation_type: OperationType::Update,
                target: MutationTarget::with_id(EntityKind::Product, id),
                payload: MutationPayload {
                    url: format!("/api/products/{id}"),
                    method: HttpMethod::Put,
                    headers: Headers::new(),
                    body: Some(json!({"id": id})),
                },
            })
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn offline_drain_sends_nothing() {
        let h = harness();
        enqueue(&h.queue, "1");
        h.connectivity.set_online(false);

        let report = h.engine.drain().await.unwrap();
        assert!(report.offline);
        assert_eq!(h.mock.request_count(), 0);
        assert_eq!(h.engine.stats().drains, 0);
    }

    #[tokio::test]
    async fn drain_completes_in_order() {
        let h = harness();
        let ids: Vec<_> = ["1", "2", "3"].iter().map(|i| enqueue(&h.queue, i)).collect();

        let report = h.engine.drain().await.unwrap();
        assert_eq!(report.completed, 3);
        let urls: Vec<_> = h.mock.requests().into_iter().map(|r| r.url).collect();
        assert!(urls[0].ends_with("/api/products/1"));
        assert!(urls[2].ends_with("/api/products/3"));
        for id in ids {
            assert_eq!(h.queue.get(&id).unwrap().status, MutationStatus::Completed);
        }
    }

    #[tokio::test]
    async fn failure_does_not_block_later_mutations() {
        let h = harness();
        let first = enqueue(&h.queue, "1");
        let second = enqueue(&h.queue, "2");
        h.mock.push_response(HttpResponse::new(500, json!(null)));

        let report = h.engine.drain().await.unwrap();
        assert_eq!(report.retried, 1);
        assert_eq!(report.completed, 1);
        assert_eq!(h.queue.get(&first).unwrap().status, MutationStatus::Pending);
        assert_eq!(h.queue.get(&second).unwrap().status, MutationStatus::Completed);
    }

    #[tokio::test]
    async fn exhausted_mutation_is_reported_and_skipped() {
        let h = harness();
        let id = enqueue(&h.queue, "1");
        h.mock
            .respond_with(|_| Ok(HttpResponse::new(503, json!(null))));

        for _ in 0..3 {
            h.engine.drain().await.unwrap();
        }
        let m = h.queue.get(&id).unwrap();
        assert_eq!(m.status, MutationStatus::Failed);
        assert_eq!(m.attempt_count, 3);
        assert_eq!(h.sink.for_component(Component::Sync).len(), 1);

        let report = h.engine.drain().await.unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(h.mock.request_count(), 3);
        assert_eq!(h.engine.stats().exhausted, 1);
    }

    #[tokio::test]
    async fn guard_resets_after_drain() {
        let h = harness();
        enqueue(&h.queue, "1");
        h.engine.drain().await.unwrap();
        assert!(!h.engine.is_draining());
    }

    struct Refusing;

    impl BackgroundScheduler for Refusing {
        fn register(&self, _tag: &str) -> Result<(), String> {
            Err("no service worker".into())
        }
    }

    #[test]
    fn background_registration_failure_is_absorbed() {
        let h = harness();
        assert!(!h.engine.register_background(&Refusing, "sync-requests"));
        let reported = h.sink.for_component(Component::Background);
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].disposition, Disposition::Silent);
    }
}
