//! Endpoint routing and the known-supported allow-list.

use crate::config::SyncConfig;
use std::fmt;

/// Backend service an endpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Authentication and token refresh.
    Security,
    /// User accounts.
    Identity,
    /// Categories, products and providers.
    Catalog,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Security => "security",
            Self::Identity => "identity",
            Self::Catalog => "catalog",
        })
    }
}

/// Strips the query string and fragment.
pub fn endpoint_path(endpoint: &str) -> &str {
    let end = endpoint.find(['?', '#']).unwrap_or(endpoint.len());
    &endpoint[..end]
}

/// True if `path` equals `prefix` or continues it at a `/` boundary.
fn matches_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Service that owns `endpoint`. Unknown paths go to the security service.
pub fn route(endpoint: &str) -> Service {
    let path = endpoint_path(endpoint);
    if matches_prefix(path, "/api/Auth") {
        Service::Security
    } else if matches_prefix(path, "/api/users") || matches_prefix(path, "/api/Users") {
        Service::Identity
    } else if ["/api/categories", "/api/products", "/api/providers"]
        .iter()
        .any(|p| matches_prefix(path, p))
    {
        Service::Catalog
    } else {
        Service::Security
    }
}

/// Resolves logical endpoints to absolute URLs and answers allow-list queries.
#[derive(Debug, Clone)]
pub struct Router {
    security_url: String,
    identity_url: String,
    catalog_url: String,
    supported: Vec<String>,
}

impl Router {
    /// Builds a router from configuration.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            security_url: config.security_url.trim_end_matches('/').to_string(),
            identity_url: config.identity_url.trim_end_matches('/').to_string(),
            catalog_url: config.catalog_url.trim_end_matches('/').to_string(),
            supported: config.supported_endpoints.clone(),
        }
    }

    /// Base URL of `service`.
    pub fn base_url(&self, service: Service) -> &str {
        match service {
            Service::Security => &self.security_url,
            Service::Identity => &self.identity_url,
            Service::Catalog => &self.catalog_url,
        }
    }

    /// Absolute URL for `endpoint`.
    pub fn resolve(&self, endpoint: &str) -> String {
        let base = self.base_url(route(endpoint));
        if endpoint.starts_with('/') {
            format!("{base}{endpoint}")
        } else {
            format!("{base}/{endpoint}")
        }
    }

    /// Whether `endpoint` is on the allow-list. Query strings are ignored.
    pub fn is_known_supported(&self, endpoint: &str) -> bool {
        let path = endpoint_path(endpoint);
        self.supported.iter().any(|p| matches_prefix(path, p))
    }
}
