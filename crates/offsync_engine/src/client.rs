//! The shared network path: routing, bearer credentials, timeout and refresh.

use crate::config::SyncConfig;
use crate::credentials::{CredentialStore, TokenSet};
use crate::error::{SyncError, SyncResult};
use crate::routing::Router;
use crate::transport::Transport;
use crate::types::{Headers, HttpMethod, HttpRequest, HttpResponse, AUTHORIZATION};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::Mutex;

/// Endpoint that exchanges a refresh token for a new token set.
pub const REFRESH_ENDPOINT: &str = "/api/Auth/refresh";

/// Sends logical requests through a [`Transport`].
///
/// Used by both the gateway and the sync engine so that live requests and
/// replayed mutations are authorized the same way.
pub struct ApiClient<T: Transport> {
    transport: T,
    router: Router,
    credentials: CredentialStore,
    timeout: Duration,
    refresh: Mutex<()>,
}

impl<T: Transport> ApiClient<T> {
    /// Creates a client.
    pub fn new(config: &SyncConfig, transport: T, credentials: CredentialStore) -> Self {
        Self {
            transport,
            router: Router::new(config),
            credentials,
            timeout: config.request_timeout,
            refresh: Mutex::new(()),
        }
    }

    /// The router used to resolve endpoints.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// The credential store.
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Sends a request and returns the 2xx response.
    ///
    /// A 401 triggers exactly one token refresh followed by one retry. A
    /// failed refresh, or a second 401, is [`SyncError::SessionExpired`].
    /// Other non-2xx statuses become [`SyncError::Http`].
    ///
    /// Concurrent 401s share one refresh: whoever waits on it retries with
    /// the token it produced.
    pub async fn execute(
        &self,
        method: HttpMethod,
        endpoint: &str,
        headers: &Headers,
        body: Option<&Value>,
    ) -> SyncResult<HttpResponse> {
        let (mut response, sent_with) = self
            .send_authorized(method, endpoint, headers, body)
            .await?;

        if response.status == 401 {
            tracing::debug!(endpoint, "unauthorized, refreshing session");
            self.renew_session(sent_with.as_deref()).await?;
            (response, _) = self.send_authorized(method, endpoint, headers, body).await?;
            if response.status == 401 {
                tracing::warn!(endpoint, "still unauthorized after refresh");
                return Err(SyncError::SessionExpired);
            }
        }

        if response.is_success() {
            Ok(response)
        } else {
            Err(SyncError::Http {
                status: response.status,
                body: response.body,
            })
        }
    }

    /// Sends with the stored bearer token and returns the token used.
    async fn send_authorized(
        &self,
        method: HttpMethod,
        endpoint: &str,
        headers: &Headers,
        body: Option<&Value>,
    ) -> SyncResult<(HttpResponse, Option<String>)> {
        let mut headers = headers.clone();
        headers.remove(AUTHORIZATION);
        let token = self.credentials.token()?;
        if let Some(token) = &token {
            headers.insert(AUTHORIZATION.to_string(), format!("Bearer {token}"));
        }

        let request = HttpRequest {
            method,
            url: self.router.resolve(endpoint),
            headers,
            body: body.cloned(),
        };
        Ok((self.send(request).await?, token))
    }

    async fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        match tokio::time::timeout(self.timeout, self.transport.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout),
        }
    }

    /// Refreshes after `rejected` drew a 401, unless another request
    /// already replaced it while this one waited for the lock.
    async fn renew_session(&self, rejected: Option<&str>) -> SyncResult<()> {
        let _guard = self.refresh.lock().await;
        let current = self.credentials.token()?;
        if current.is_some() && current.as_deref() != rejected {
            tracing::debug!("session already refreshed by a concurrent request");
            return Ok(());
        }
        self.exchange_refresh_token().await.map(|_| ())
    }

    /// Exchanges the stored refresh token for a new token set.
    pub async fn refresh_session(&self) -> SyncResult<TokenSet> {
        let _guard = self.refresh.lock().await;
        self.exchange_refresh_token().await
    }

    async fn exchange_refresh_token(&self) -> SyncResult<TokenSet> {
        let Some(current) = self.credentials.load()? else {
            tracing::info!("no refresh token stored");
            return Err(SyncError::SessionExpired);
        };

        let request = HttpRequest {
            method: HttpMethod::Post,
            url: self.router.resolve(REFRESH_ENDPOINT),
            headers: Headers::new(),
            body: Some(json!({
                "token": current.token,
                "refreshToken": current.refresh_token,
            })),
        };

        let response = match self.send(request).await {
            Ok(response) if response.is_success() => response,
            Ok(response) => {
                tracing::warn!(status = response.status, "token refresh rejected");
                return Err(SyncError::SessionExpired);
            }
            Err(e) => {
                tracing::warn!(error = %e, "token refresh failed");
                return Err(SyncError::SessionExpired);
            }
        };

        let tokens = TokenSet::from_response(&response.body).map_err(|e| {
            tracing::warn!(error = %e, "token refresh returned no tokens");
            SyncError::SessionExpired
        })?;
        self.credentials.save(&tokens)?;
        tracing::info!("session refreshed");
        Ok(tokens)
    }
}

impl<T: Transport> std::fmt::Debug for ApiClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("router", &self.router)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
