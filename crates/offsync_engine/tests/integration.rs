//! Integration tests for the gateway, queue and sync engine.

use offsync_engine::{
    offline_marker, EntityKind, GatewayResponse, HttpMethod, HttpResponse, LogicalRequest,
    MockTransport, MutationStatus, OfflineClient, OperationType, SyncConfig, SyncError, TokenSet,
};
use offsync_store::LocalStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

fn client_with(config: SyncConfig) -> (OfflineClient<MockTransport>, MockTransport) {
    let mock = MockTransport::new();
    let store = Arc::new(LocalStore::in_memory().unwrap());
    let client = OfflineClient::with_store(&config, store, mock.clone()).unwrap();
    (client, mock)
}

fn client() -> (OfflineClient<MockTransport>, MockTransport) {
    client_with(SyncConfig::default())
}

fn login(client: &OfflineClient<MockTransport>, token: &str) {
    client
        .credentials()
        .save(&TokenSet {
            token: token.into(),
            refresh_token: format!("{token}-refresh"),
            expires_at: None,
            refresh_token_expires_at: None,
        })
        .unwrap();
}

fn update_user(id: &str, name: &str) -> LogicalRequest {
    LogicalRequest::put(format!("/api/users/{id}"), json!({"name": name}))
        .for_entity(EntityKind::User, Some(id))
}

/// Takes the network down and tells the monitor about it.
fn go_offline(client: &OfflineClient<MockTransport>, mock: &MockTransport) {
    client.connectivity().set_online(false);
    mock.set_reachable(false);
}

/// Brings the network back, dropping the failed attempts made while it was
/// down, then flips the monitor.
fn reconnect(client: &OfflineClient<MockTransport>, mock: &MockTransport) {
    mock.set_reachable(true);
    mock.clear_requests();
    client.connectivity().set_online(true);
}

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn offline_put_is_queued() {
    let (client, mock) = client();
    go_offline(&client, &mock);

    let response = client.request(update_user("42", "Bob")).await.unwrap();
    assert_eq!(response.body(), json!({"success": true, "offline": true}));
    assert_eq!(mock.requests_to("/api/users/42").len(), 1);

    let pending = client.queue().list_pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, MutationStatus::Pending);
    assert_eq!(pending[0].entity_kind, EntityKind::User);
    assert_eq!(pending[0].entity_id.as_deref(), Some("42"));
    assert_eq!(pending[0].operation_type, OperationType::Update);
    assert_eq!(pending[0].attempt_count, 0);
}

#[tokio::test]
async fn reconnect_drain_sends_queued_put() {
    let (client, mock) = client();
    go_offline(&client, &mock);
    let queued = client.request(update_user("42", "Bob")).await.unwrap();
    let GatewayResponse::Queued { mutation_id } = queued else {
        panic!("expected a queued response, got {queued:?}");
    };

    reconnect(&client, &mock);
    let report = client.sync_now().await.unwrap();
    assert_eq!(report.completed, 1);

    let sent = mock.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, HttpMethod::Put);
    assert!(sent[0].url.ends_with("/api/users/42"));
    assert_eq!(sent[0].body, Some(json!({"name": "Bob"})));
    assert_eq!(
        client.queue().get(&mutation_id).unwrap().status,
        MutationStatus::Completed
    );
    assert!(client.queue().list_pending().unwrap().is_empty());
}

#[tokio::test]
async fn cached_read_survives_going_offline() {
    let (client, mock) = client();
    let categories = json!([{"id": 1, "name": "Tea"}, {"id": 2, "name": "Coffee"}]);
    mock.push_response(HttpResponse::ok(categories.clone()));

    let online = client.request(LogicalRequest::get("/api/categories")).await.unwrap();
    assert_eq!(online.body(), categories);

    client.connectivity().set_online(false);
    let offline = client.request(LogicalRequest::get("/api/categories")).await.unwrap();
    assert!(matches!(offline, GatewayResponse::Cached { .. }));
    assert_eq!(offline.body(), categories);
    assert_eq!(mock.request_count(), 1);
}

#[tokio::test]
async fn expired_token_is_refreshed_transparently() {
    let (client, mock) = client();
    login(&client, "stale");
    mock.push_response(HttpResponse::new(401, Value::Null));
    mock.push_response(HttpResponse::ok(json!({
        "token": "fresh",
        "refreshToken": "fresh-refresh",
        "expiresAt": "2026-12-31T00:00:00Z",
        "refreshTokenExpiresAt": "2027-01-31T00:00:00Z"
    })));
    mock.push_response(HttpResponse::ok(json!([{"id": "p1"}])));

    let response = client.request(LogicalRequest::get("/api/products")).await.unwrap();
    assert_eq!(response.body(), json!([{"id": "p1"}]));

    let sent = mock.requests();
    assert_eq!(sent.len(), 3);
    assert!(sent[1].url.ends_with("/api/Auth/refresh"));
    assert_eq!(sent[2].bearer(), Some("fresh"));

    let stored = client.credentials().load().unwrap().unwrap();
    assert_eq!(stored.token, "fresh");
    assert_eq!(stored.refresh_token_expires_at.as_deref(), Some("2027-01-31T00:00:00Z"));
}

#[tokio::test]
async fn every_mutation_completes_against_healthy_backend() {
    let (client, mock) = client();
    go_offline(&client, &mock);

    let requests = [
        LogicalRequest::post("/api/categories", json!({"name": "Tea"}))
            .for_entity(EntityKind::Category, None),
        LogicalRequest::put("/api/products/7", json!({"price": 3}))
            .for_entity(EntityKind::Product, Some("7")),
        LogicalRequest::delete("/api/providers/3").for_entity(EntityKind::Provider, Some("3")),
        update_user("42", "Bob"),
    ];
    for request in requests {
        client.request(request).await.unwrap();
    }
    assert_eq!(client.queue().list_pending().unwrap().len(), 4);

    reconnect(&client, &mock);
    let report = client.sync_now().await.unwrap();

    assert_eq!(report.completed, 4);
    assert!(client.queue().list_pending().unwrap().is_empty());
    let methods: Vec<_> = mock.requests().into_iter().map(|r| r.method).collect();
    assert_eq!(
        methods,
        vec![HttpMethod::Post, HttpMethod::Put, HttpMethod::Delete, HttpMethod::Put]
    );
}

#[tokio::test]
async fn three_failures_make_a_mutation_terminal() {
    let (client, mock) = client();
    go_offline(&client, &mock);
    client.request(update_user("42", "Bob")).await.unwrap();
    reconnect(&client, &mock);
    mock.respond_with(|_| Ok(HttpResponse::new(500, json!({"error": "boom"}))));

    for _ in 0..3 {
        client.sync_now().await.unwrap();
    }
    let mutation = &client.queue().list_all().unwrap()[0];
    assert_eq!(mutation.status, MutationStatus::Failed);
    assert_eq!(mutation.attempt_count, 3);
    assert!(mutation.last_error.as_deref().unwrap().contains("500"));

    let report = client.sync_now().await.unwrap();
    assert_eq!(report.attempted, 0);
    assert_eq!(mock.request_count(), 3);
}

#[tokio::test]
async fn repeated_cache_put_keeps_latest_payload() {
    let (client, _mock) = client();
    client.cache().put("/api/users", json!(["first"])).unwrap();
    client.cache().put("/api/users", json!(["second"])).unwrap();
    assert_eq!(client.cache().get("/api/users").unwrap().payload, json!(["second"]));
}

#[tokio::test]
async fn offline_drain_is_a_no_op() {
    let (client, mock) = client();
    go_offline(&client, &mock);
    client.request(update_user("1", "A")).await.unwrap();
    let before = client.queue().list_all().unwrap();
    let sent = mock.request_count();

    let report = client.sync_now().await.unwrap();
    assert!(report.offline);
    assert_eq!(mock.request_count(), sent);
    assert_eq!(client.queue().list_all().unwrap(), before);
}

#[tokio::test]
async fn transient_write_failure_is_queued() {
    let (client, mock) = client();
    mock.push_response(HttpResponse::new(503, Value::Null));

    let response = client.request(update_user("42", "Bob")).await.unwrap();
    assert_eq!(response.body(), offline_marker());
    assert_eq!(client.queue().list_pending().unwrap().len(), 1);
}

#[tokio::test]
async fn stale_online_flag_still_falls_back_to_cache() {
    let (client, mock) = client();
    client.cache().put("/api/providers", json!(["cached"])).unwrap();
    mock.set_reachable(false);

    let response = client.request(LogicalRequest::get("/api/providers")).await.unwrap();
    assert_eq!(response.body(), json!(["cached"]));
}

#[tokio::test]
async fn stale_online_flag_queues_write_to_unreachable_backend() {
    let (client, mock) = client();
    mock.set_reachable(false);
    assert!(client.connectivity().is_online());

    let response = client.request(update_user("42", "Bob")).await.unwrap();
    assert!(matches!(response, GatewayResponse::Queued { .. }));
    assert_eq!(mock.request_count(), 1);
    assert_eq!(client.queue().list_pending().unwrap().len(), 1);
}

#[tokio::test]
async fn stale_offline_flag_still_sends_write() {
    let (client, mock) = client();
    client.connectivity().set_online(false);
    mock.push_response(HttpResponse::ok(json!({"id": "42", "name": "Bob"})));

    let response = client.request(update_user("42", "Bob")).await.unwrap();
    assert_eq!(
        response,
        GatewayResponse::Online {
            status: 200,
            body: json!({"id": "42", "name": "Bob"})
        }
    );
    let sent = mock.requests_to("/api/users/42");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].method, HttpMethod::Put);
    assert!(client.queue().list_all().unwrap().is_empty());
}

#[tokio::test]
async fn fatal_transport_error_queues_write_while_offline() {
    let (client, mock) = client();
    client.connectivity().set_online(false);
    mock.push_error(SyncError::transport_fatal("tls handshake failed"));

    let response = client.request(update_user("42", "Bob")).await.unwrap();
    assert_eq!(response.body(), offline_marker());
    assert_eq!(client.queue().list_pending().unwrap().len(), 1);
}

#[tokio::test]
async fn fatal_transport_error_surfaces_while_online() {
    let (client, mock) = client();
    mock.push_error(SyncError::transport_fatal("tls handshake failed"));

    let err = client.request(update_user("42", "Bob")).await.unwrap_err();
    assert!(matches!(err, SyncError::Transport { retryable: false, .. }));
    assert!(client.queue().list_all().unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_drains_send_each_mutation_once() {
    let (client, mock) = client();
    go_offline(&client, &mock);
    for i in 0..3 {
        client.request(update_user(&i.to_string(), "X")).await.unwrap();
    }
    reconnect(&client, &mock);
    mock.set_latency(Duration::from_millis(30));

    let (first, second) = tokio::join!(client.sync_now(), client.sync_now());
    let (first, second) = (first.unwrap(), second.unwrap());

    assert!(first.busy != second.busy);
    assert_eq!(first.completed + second.completed, 3);
    assert_eq!(mock.request_count(), 3);
    assert!(!client.engine().is_draining());
}

#[tokio::test]
async fn reconnect_triggers_auto_sync() {
    let (client, mock) = client_with(SyncConfig::default().with_sync_interval(Duration::from_secs(3600)));
    go_offline(&client, &mock);
    client.request(update_user("42", "Bob")).await.unwrap();
    let sent = mock.request_count();

    let auto = client.start_auto_sync();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(mock.request_count(), sent);

    reconnect(&client, &mock);
    assert!(wait_for(|| client.queue().list_pending().unwrap().is_empty()).await);
    assert_eq!(mock.request_count(), 1);
    auto.shutdown().await;
}

#[tokio::test]
async fn interval_timer_drains_while_online() {
    let (client, mock) =
        client_with(SyncConfig::default().with_sync_interval(Duration::from_millis(25)));
    let auto = client.start_auto_sync();

    // The monitor stays online throughout, so only the timer can drain.
    mock.set_reachable(false);
    let queued = client.request(update_user("42", "Bob")).await.unwrap();
    assert!(matches!(queued, GatewayResponse::Queued { .. }));
    mock.set_reachable(true);

    assert!(wait_for(|| client.queue().list_pending().unwrap().is_empty()).await);
    assert!(client.engine().stats().drains >= 1);
    auto.shutdown().await;
}

#[tokio::test]
async fn session_expiry_stops_the_drain() {
    let (client, mock) = client();
    go_offline(&client, &mock);
    client.request(update_user("1", "A")).await.unwrap();
    client.request(update_user("2", "B")).await.unwrap();
    reconnect(&client, &mock);
    mock.respond_with(|_| Ok(HttpResponse::new(401, Value::Null)));

    let report = client.sync_now().await.unwrap();
    assert!(report.interrupted);
    assert_eq!(report.attempted, 1);

    let all = client.queue().list_all().unwrap();
    assert_eq!(all[0].attempt_count, 1);
    assert_eq!(all[0].status, MutationStatus::Pending);
    assert_eq!(all[1].attempt_count, 0);
}

#[tokio::test]
async fn session_expired_surfaces_to_caller() {
    let (client, mock) = client();
    mock.respond_with(|_| Ok(HttpResponse::new(401, Value::Null)));

    let err = client
        .request(LogicalRequest::get("/api/products"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::SessionExpired));
}

#[tokio::test]
async fn replay_uses_current_credentials() {
    let (client, mock) = client();
    login(&client, "before");
    go_offline(&client, &mock);
    client
        .request(update_user("42", "Bob").with_header("Authorization", "Bearer before"))
        .await
        .unwrap();
    assert!(client.queue().list_all().unwrap()[0]
        .payload
        .headers
        .is_empty());

    login(&client, "after");
    reconnect(&client, &mock);
    client.sync_now().await.unwrap();
    assert_eq!(mock.requests()[0].bearer(), Some("after"));
}

#[tokio::test]
async fn interrupted_mutation_is_recovered_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = SyncConfig::default().with_store_path(dir.path());

    let id = {
        let unreachable = MockTransport::new();
        let client = OfflineClient::open(&config, unreachable.clone()).unwrap();
        go_offline(&client, &unreachable);
        let GatewayResponse::Queued { mutation_id } =
            client.request(update_user("42", "Bob")).await.unwrap()
        else {
            panic!("expected a queued response");
        };
        client.queue().mark_in_flight(&mutation_id).unwrap();
        mutation_id
    };

    let mock = MockTransport::new();
    let client = OfflineClient::open(&config, mock.clone()).unwrap();
    assert_eq!(client.queue().get(&id).unwrap().status, MutationStatus::Pending);

    client.sync_now().await.unwrap();
    assert_eq!(client.queue().get(&id).unwrap().status, MutationStatus::Completed);
    assert_eq!(mock.request_count(), 1);
}
