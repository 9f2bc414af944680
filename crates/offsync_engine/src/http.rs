//! HTTP transport backed by `reqwest`.

use crate::error::{SyncError, SyncResult};
use crate::transport::Transport;
use crate::types::{HttpMethod, HttpRequest, HttpResponse};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Sends requests over HTTP(S) with JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport whose connections time out after `connect_timeout`.
    pub fn new(connect_timeout: Duration) -> SyncResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("offsync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::Config(format!("cannot build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Delete => reqwest::Method::DELETE,
    }
}

fn classify(error: reqwest::Error) -> SyncError {
    if error.is_timeout() {
        SyncError::Timeout
    } else if error.is_builder() {
        SyncError::transport_fatal(error.to_string())
    } else {
        SyncError::transport_retryable(error.to_string())
    }
}

/// Decodes a body as JSON, falling back to a string for non-JSON payloads.
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

impl Transport for HttpTransport {
    fn send(&self, request: HttpRequest) -> impl Future<Output = SyncResult<HttpResponse>> + Send {
        let client = self.client.clone();
        async move {
            let mut builder = client.request(method(request.method), &request.url);
            for (name, value) in &request.headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if let Some(body) = &request.body {
                builder = builder.json(body);
            }

            tracing::trace!(method = %request.method, url = %request.url, "sending request");
            let response = builder.send().await.map_err(classify)?;
            let status = response.status().as_u16();
            let bytes = response.bytes().await.map_err(classify)?;

            Ok(HttpResponse {
                status,
                body: decode_body(&bytes),
            })
        }
    }
}
