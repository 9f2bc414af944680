//! Transport layer abstraction.

use crate::error::{SyncError, SyncResult};
use crate::types::{HttpRequest, HttpResponse};
use parking_lot::Mutex;
use serde_json::json;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Sends routed requests to the backend.
///
/// Non-2xx statuses are returned as responses, not errors; only failures
/// below HTTP (DNS, refused connection, TLS) are `Err`.
pub trait Transport: Send + Sync + 'static {
    /// Sends one request.
    fn send(&self, request: HttpRequest) -> impl Future<Output = SyncResult<HttpResponse>> + Send;
}

type Handler = Box<dyn Fn(&HttpRequest) -> SyncResult<HttpResponse> + Send + Sync>;

/// A scriptable transport for tests.
///
/// Responses come from the scripted queue first, then from the handler
/// (a 200 with `{}` unless replaced). Clones share state.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<MockInner>,
}

struct MockInner {
    reachable: AtomicBool,
    latency: Mutex<Duration>,
    scripted: Mutex<VecDeque<SyncResult<HttpResponse>>>,
    handler: Mutex<Handler>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// Creates a reachable mock that answers every request with 200 `{}`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MockInner {
                reachable: AtomicBool::new(true),
                latency: Mutex::new(Duration::ZERO),
                scripted: Mutex::new(VecDeque::new()),
                handler: Mutex::new(Box::new(|_| Ok(HttpResponse::ok(json!({}))))),
                requests: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Replaces the fallback handler.
    pub fn respond_with<F>(&self, handler: F)
    where
        F: Fn(&HttpRequest) -> SyncResult<HttpResponse> + Send + Sync + 'static,
    {
        *self.inner.handler.lock() = Box::new(handler);
    }

    /// Queues a one-shot response.
    pub fn push_response(&self, response: HttpResponse) {
        self.inner.scripted.lock().push_back(Ok(response));
    }

    /// Queues a one-shot failure.
    pub fn push_error(&self, error: SyncError) {
        self.inner.scripted.lock().push_back(Err(error));
    }

    /// When unreachable, every request fails with a retryable transport error.
    pub fn set_reachable(&self, reachable: bool) {
        self.inner.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Delays every response.
    pub fn set_latency(&self, latency: Duration) {
        *self.inner.latency.lock() = latency;
    }

    /// Requests seen so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.inner.requests.lock().clone()
    }

    /// Forgets the requests seen so far.
    pub fn clear_requests(&self) {
        self.inner.requests.lock().clear();
    }

    /// Number of requests seen so far.
    pub fn request_count(&self) -> usize {
        self.inner.requests.lock().len()
    }

    /// Requests whose URL ends with `suffix`.
    pub fn requests_to(&self, suffix: &str) -> Vec<HttpRequest> {
        self.inner
            .requests
            .lock()
            .iter()
            .filter(|r| r.url.ends_with(suffix))
            .cloned()
            .collect()
    }

    fn answer(&self, request: &HttpRequest) -> SyncResult<HttpResponse> {
        self.inner.requests.lock().push(request.clone());
        if !self.inner.reachable.load(Ordering::SeqCst) {
            return Err(SyncError::transport_retryable("network unreachable"));
        }
        if let Some(scripted) = self.inner.scripted.lock().pop_front() {
            return scripted;
        }
        (self.inner.handler.lock())(request)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("reachable", &self.inner.reachable.load(Ordering::SeqCst))
            .field("requests", &self.request_count())
            .finish()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: HttpRequest) -> impl Future<Output = SyncResult<HttpResponse>> + Send {
        let latency = *self.inner.latency.lock();
        let result = self.answer(&request);
        async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            result
        }
    }
}
