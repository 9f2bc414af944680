//! The single entry point for application requests.

use crate::cache::ResponseCache;
use crate::client::ApiClient;
use crate::connectivity::ConnectivityMonitor;
use crate::diagnostics::{Component, DiagnosticsSink};
use crate::error::{SyncError, SyncResult};
use crate::mutation::{MutationPayload, MutationRequest, OperationType};
use crate::queue::MutationQueue;
use crate::transport::Transport;
use crate::types::{HttpMethod, LogicalRequest};
use serde_json::{json, Value};
use std::sync::Arc;

/// How a request was satisfied.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayResponse {
    /// Answered by the backend.
    Online {
        /// HTTP status.
        status: u16,
        /// Response body.
        body: Value,
    },
    /// Served from the response cache.
    Cached {
        /// Cached body.
        body: Value,
        /// When it was fetched, milliseconds since the Unix epoch.
        fetched_at: u64,
    },
    /// Queued for replay.
    Queued {
        /// Id of the queued mutation.
        mutation_id: String,
    },
}

impl GatewayResponse {
    /// Body to hand to the application.
    ///
    /// Queued writes yield the marker `{"success": true, "offline": true}`.
    pub fn body(&self) -> Value {
        match self {
            Self::Online { body, .. } | Self::Cached { body, .. } => body.clone(),
            Self::Queued { .. } => offline_marker(),
        }
    }

    /// True unless the backend answered.
    pub fn is_offline(&self) -> bool {
        !matches!(self, Self::Online { .. })
    }
}

/// Body returned for writes accepted offline.
pub fn offline_marker() -> Value {
    json!({"success": true, "offline": true})
}

/// Routes requests to the network, the cache or the mutation queue.
pub struct Gateway<T: Transport> {
    client: Arc<ApiClient<T>>,
    cache: Arc<ResponseCache>,
    queue: Arc<MutationQueue>,
    connectivity: ConnectivityMonitor,
    diagnostics: Arc<dyn DiagnosticsSink>,
}

impl<T: Transport> Gateway<T> {
    /// Creates a gateway.
    pub fn new(
        client: Arc<ApiClient<T>>,
        cache: Arc<ResponseCache>,
        queue: Arc<MutationQueue>,
        connectivity: ConnectivityMonitor,
        diagnostics: Arc<dyn DiagnosticsSink>,
    ) -> Self {
        Self {
            client,
            cache,
            queue,
            connectivity,
            diagnostics,
        }
    }

    /// Issues `request`.
    ///
    /// Reads of supported endpoints are served from the cache when offline,
    /// fall back to it on a transient failure, and refresh it on success.
    /// Writes always reach for the network first; those to supported
    /// endpoints that carry a target are queued when the attempt fails and
    /// [`Self::should_fall_back`] allows it. Everything else goes straight
    /// to the network.
    pub async fn request(&self, request: LogicalRequest) -> SyncResult<GatewayResponse> {
        let supported = self.client.router().is_known_supported(&request.endpoint);
        if request.method == HttpMethod::Get {
            self.read(&request, supported).await
        } else {
            self.write(request, supported).await
        }
    }

    async fn read(&self, request: &LogicalRequest, supported: bool) -> SyncResult<GatewayResponse> {
        let endpoint = request.endpoint.as_str();

        if supported && !self.connectivity.is_online() {
            tracing::debug!(endpoint, "offline, serving from cache");
            return match self.cache.get(endpoint) {
                Ok(entry) => Ok(GatewayResponse::Cached {
                    body: entry.payload,
                    fetched_at: entry.fetched_at,
                }),
                Err(SyncError::CacheMiss { .. }) => Err(SyncError::NoConnectionNoCache {
                    endpoint: endpoint.to_string(),
                }),
                Err(e) => Err(e),
            };
        }

        let result = self
            .client
            .execute(request.method, endpoint, &request.headers, request.body.as_ref())
            .await;

        match result {
            Ok(response) => {
                if supported {
                    if let Err(e) = self.cache.put(endpoint, response.body.clone()) {
                        self.diagnostics.report(Component::Cache, &e);
                    }
                }
                Ok(GatewayResponse::Online {
                    status: response.status,
                    body: response.body,
                })
            }
            Err(error) if supported && self.should_fall_back(&error) => {
                match self.cache.get(endpoint) {
                    Ok(entry) => {
                        tracing::debug!(endpoint, error = %error, "network failed, serving from cache");
                        Ok(GatewayResponse::Cached {
                            body: entry.payload,
                            fetched_at: entry.fetched_at,
                        })
                    }
                    Err(_) => Err(error),
                }
            }
            Err(error) => Err(error),
        }
    }

    async fn write(&self, request: LogicalRequest, supported: bool) -> SyncResult<GatewayResponse> {
        let queueable = supported && request.target.is_some();

        let result = self
            .client
            .execute(
                request.method,
                &request.endpoint,
                &request.headers,
                request.body.as_ref(),
            )
            .await;

        match result {
            Ok(response) => Ok(GatewayResponse::Online {
                status: response.status,
                body: response.body,
            }),
            Err(error) if queueable && self.should_fall_back(&error) => {
                tracing::debug!(endpoint = %request.endpoint, error = %error, "network failed, queueing write");
                self.enqueue(request).map_err(|e| {
                    self.diagnostics.report(Component::Queue, &e);
                    error
                })
            }
            Err(error) => Err(error),
        }
    }

    /// Transient failures always fall back. While the monitor reports
    /// offline, any failure below HTTP does too.
    ///
    /// Backend rejections (`4xx` other than 408 and 429) never fall back,
    /// for reads as well as writes: a cached body is not served in place of
    /// a 404 or a validation error.
    fn should_fall_back(&self, error: &SyncError) -> bool {
        error.is_transient() || (error.is_transport() && !self.connectivity.is_online())
    }

    fn enqueue(&self, request: LogicalRequest) -> SyncResult<GatewayResponse> {
        let (Some(target), Some(operation_type)) =
            (request.target, OperationType::from_method(request.method))
        else {
            return Err(SyncError::Config(format!(
                "{} {} cannot be queued",
                request.method, request.endpoint
            )));
        };

        let mutation = self.queue.enqueue(MutationRequest {
            operation_type,
            target,
            payload: MutationPayload {
                url: request.endpoint,
                method: request.method,
                headers: request.headers,
                body: request.body,
            },
        })?;
        Ok(GatewayResponse::Queued {
            mutation_id: mutation.id,
        })
    }
}

impl<T: Transport> std::fmt::Debug for Gateway<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("online", &self.connectivity.is_online())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::credentials::CredentialStore;
    use crate::diagnostics::TracingSink;
    use crate::mutation::{EntityKind, MutationStatus};
    use crate::transport::MockTransport;
    use crate::types::HttpResponse;
    use offsync_store::{app_schema, LocalStore};

    struct Harness {
        mock: MockTransport,
        cache: Arc<ResponseCache>,
        queue: Arc<MutationQueue>,
        connectivity: ConnectivityMonitor,
        gateway: Gateway<MockTransport>,
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
        let cache = Arc::new(ResponseCache::new(store.clone()));
        let queue = Arc::new(MutationQueue::new(store, 3).unwrap());
        let connectivity = ConnectivityMonitor::new(true);
        let gateway = Gateway::new(
            client,
            cache.clone(),
            queue.clone(),
            connectivity.clone(),
            Arc::new(TracingSink::default()),
        );
        Harness {
            mock,
            cache,
            queue,
            connectivity,
            gateway,
        }
    }

    #[tokio::test]
    async fn online_read_writes_through() {
        let h = harness();
        h.mock.push_response(HttpResponse::ok(json!([{"id": 1}])));

        let response = h.gateway.request(LogicalRequest::get("/api/categories")).await.unwrap();
        assert!(!response.is_offline());
        assert_eq!(h.cache.get("/api/categories").unwrap().payload, json!([{"id": 1}]));
    }

    #[tokio::test]
    async fn unsupported_read_is_not_cached() {
        let h = harness();
        h.gateway.request(LogicalRequest::get("/api/orders")).await.unwrap();
        assert!(h.cache.is_empty().unwrap());
    }

    #[tokio::test]
    async fn offline_read_without_cache_fails() {
        let h = harness();
        h.connectivity.set_online(false);

        let err = h.gateway.request(LogicalRequest::get("/api/products")).await.unwrap_err();
        assert!(matches!(err, SyncError::NoConnectionNoCache { .. }));
        assert_eq!(h.mock.request_count(), 0);
    }

    #[tokio::test]
    async fn transient_read_failure_serves_cache() {
        let h = harness();
        h.cache.put("/api/products", json!(["cached"])).unwrap();
        h.mock.push_response(HttpResponse::new(502, Value::Null));

        let response = h.gateway.request(LogicalRequest::get("/api/products")).await.unwrap();
        assert!(matches!(response, GatewayResponse::Cached { .. }));
        assert_eq!(response.body(), json!(["cached"]));
    }

    #[tokio::test]
    async fn rejected_read_is_not_masked_by_cache() {
        let h = harness();
        h.cache.put("/api/products/9", json!("stale")).unwrap();
        h.mock.push_response(HttpResponse::new(404, json!({"error": "gone"})));

        let err = h
            .gateway
            .request(LogicalRequest::get("/api/products/9"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Http { status: 404, .. }));
    }

    #[tokio::test]
    async fn unreachable_write_is_queued() {
        let h = harness();
        h.connectivity.set_online(false);
        h.mock.set_reachable(false);

        let response = h
            .gateway
            .request(
                LogicalRequest::post("/api/categories", json!({"name": "Tea"}))
                    .for_entity(EntityKind::Category, None),
            )
            .await
            .unwrap();
        assert_eq!(response.body(), offline_marker());
        assert_eq!(h.mock.request_count(), 1);

        let queued = h.queue.list_pending().unwrap();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].operation_type, OperationType::Create);
        assert_eq!(queued[0].status, MutationStatus::Pending);
    }

    #[tokio::test]
    async fn write_is_sent_while_flag_says_offline() {
        let h = harness();
        h.connectivity.set_online(false);
        h.mock.push_response(HttpResponse::new(201, json!({"id": 42})));

        let response = h
            .gateway
            .request(
                LogicalRequest::put("/api/users/42", json!({"name": "Ada"}))
                    .for_entity(EntityKind::User, Some("42")),
            )
            .await
            .unwrap();
        assert_eq!(
            response,
            GatewayResponse::Online {
                status: 201,
                body: json!({"id": 42})
            }
        );
        assert_eq!(h.mock.requests_to("/api/users/42").len(), 1);
        assert!(h.queue.list_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fatal_transport_error_is_queued_while_offline() {
        let h = harness();
        h.connectivity.set_online(false);
        h.mock.push_error(SyncError::transport_fatal("certificate rejected"));

        let response = h
            .gateway
            .request(
                LogicalRequest::delete("/api/products/7")
                    .for_entity(EntityKind::Product, Some("7")),
            )
            .await
            .unwrap();
        assert!(matches!(response, GatewayResponse::Queued { .. }));
        assert_eq!(h.queue.list_pending().unwrap()[0].operation_type, OperationType::Delete);
    }

    #[tokio::test]
    async fn fatal_transport_error_propagates_while_online() {
        let h = harness();
        h.mock.push_error(SyncError::transport_fatal("certificate rejected"));

        let err = h
            .gateway
            .request(
                LogicalRequest::delete("/api/products/7")
                    .for_entity(EntityKind::Product, Some("7")),
            )
            .await
            .unwrap_err();
        assert!(err.is_transport());
        assert!(!err.is_transient());
        assert!(h.queue.list_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn write_without_target_is_never_queued() {
        let h = harness();
        h.mock.set_reachable(false);

        let err = h
            .gateway
            .request(LogicalRequest::post("/api/categories", json!({})))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(h.queue.list_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsupported_write_is_never_queued() {
        let h = harness();
        h.connectivity.set_online(false);
        h.mock.set_reachable(false);

        let result = h
            .gateway
            .request(
                LogicalRequest::post("/api/orders", json!({})).for_entity(EntityKind::Order, None),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(h.mock.request_count(), 1);
        assert!(h.queue.list_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn validation_error_propagates() {
        let h = harness();
        h.mock.push_response(HttpResponse::new(400, json!({"name": "required"})));

        let err = h
            .gateway
            .request(
                LogicalRequest::post("/api/products", json!({}))
                    .for_entity(EntityKind::Product, None),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Http { status: 400, .. }));
        assert!(h.queue.list_all().unwrap().is_empty());
    }
}
