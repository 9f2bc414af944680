//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Endpoint prefixes whose responses are cached and whose writes are queued.
pub const DEFAULT_SUPPORTED_ENDPOINTS: [&str; 5] = [
    "/api/users",
    "/api/Users",
    "/api/categories",
    "/api/products",
    "/api/providers",
];

/// Default background sync registration tag.
pub const DEFAULT_BACKGROUND_TAG: &str = "sync-requests";

/// Configuration for the gateway and sync engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Base URL of the security (auth) service.
    pub security_url: String,
    /// Base URL of the identity (users) service.
    pub identity_url: String,
    /// Base URL of the catalog service.
    pub catalog_url: String,
    /// Known-supported endpoint prefixes.
    pub supported_endpoints: Vec<String>,
    /// Failed attempts before a mutation becomes terminal.
    pub max_retries: u32,
    /// Interval of the periodic drain while online.
    pub sync_interval: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Tag registered with the host background scheduler.
    pub background_tag: String,
    /// Store directory; the platform data directory when unset.
    pub store_path: Option<PathBuf>,
}

impl SyncConfig {
    /// Creates a configuration with the three service base URLs.
    pub fn new(
        security_url: impl Into<String>,
        identity_url: impl Into<String>,
        catalog_url: impl Into<String>,
    ) -> Self {
        Self {
            security_url: security_url.into(),
            identity_url: identity_url.into(),
            catalog_url: catalog_url.into(),
            supported_endpoints: DEFAULT_SUPPORTED_ENDPOINTS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_retries: 3,
            sync_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(15),
            background_tag: DEFAULT_BACKGROUND_TAG.to_string(),
            store_path: None,
        }
    }

    /// Replaces the supported endpoint prefixes.
    pub fn with_supported_endpoints<I, S>(mut self, endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_endpoints = endpoints.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the retry limit.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the periodic drain interval.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the background sync tag.
    pub fn with_background_tag(mut self, tag: impl Into<String>) -> Self {
        self.background_tag = tag.into();
        self
    }

    /// Sets the store directory.
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Checks the values that would make the engine misbehave.
    pub fn validate(&self) -> SyncResult<()> {
        for (name, url) in [
            ("security_url", &self.security_url),
            ("identity_url", &self.identity_url),
            ("catalog_url", &self.catalog_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(SyncError::Config(format!(
                    "{name} must be an http(s) URL, got {url:?}"
                )));
            }
        }
        if self.max_retries == 0 {
            return Err(SyncError::Config("max_retries must be at least 1".into()));
        }
        if self.sync_interval.is_zero() {
            return Err(SyncError::Config("sync_interval must be non-zero".into()));
        }
        if self.request_timeout.is_zero() {
            return Err(SyncError::Config("request_timeout must be non-zero".into()));
        }
        if let Some(bad) = self.supported_endpoints.iter().find(|e| !e.starts_with('/')) {
            return Err(SyncError::Config(format!(
                "supported endpoint {bad:?} must start with '/'"
            )));
        }
        Ok(())
    }

    /// Loads a YAML configuration file.
    ///
    /// ```yaml
    /// security_url: https://auth.example.com
    /// identity_url: https://users.example.com
    /// catalog_url: https://catalog.example.com
    /// sync_interval_secs: 60
    /// ```
    pub fn from_yaml_file(path: &Path) -> SyncResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Parses a YAML configuration document.
    pub fn from_yaml_str(text: &str) -> SyncResult<Self> {
        let file: FileConfig =
            serde_yaml::from_str(text).map_err(|e| SyncError::Config(e.to_string()))?;

        let mut config = Self::new(file.security_url, file.identity_url, file.catalog_url);
        if let Some(endpoints) = file.supported_endpoints {
            config.supported_endpoints = endpoints;
        }
        if let Some(max_retries) = file.max_retries {
            config.max_retries = max_retries;
        }
        if let Some(secs) = file.sync_interval_secs {
            config.sync_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = file.request_timeout_secs {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(tag) = file.background_tag {
            config.background_tag = tag;
        }
        config.store_path = file.store_path;

        config.validate()?;
        Ok(config)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(
            "http://localhost:5001",
            "http://localhost:5002",
            "http://localhost:5003",
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    security_url: String,
    identity_url: String,
    catalog_url: String,
    supported_endpoints: Option<Vec<String>>,
    max_retries: Option<u32>,
    sync_interval_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    background_tag: Option<String>,
    store_path: Option<PathBuf>,
}
