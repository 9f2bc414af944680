//! Persistent bearer credentials.

use crate::error::{SyncError, SyncResult};
use offsync_store::{LocalStore, CREDENTIALS};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

const TOKEN: &str = "token";
const REFRESH_TOKEN: &str = "refreshToken";
const EXPIRES_AT: &str = "expiresAt";
const REFRESH_TOKEN_EXPIRES_AT: &str = "refreshTokenExpiresAt";

/// Tokens as issued by the security service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSet {
    /// Bearer token.
    pub token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// Bearer expiry, as sent by the backend.
    #[serde(default)]
    pub expires_at: Option<String>,
    /// Refresh token expiry, as sent by the backend.
    #[serde(default)]
    pub refresh_token_expires_at: Option<String>,
}

/// Stores credentials in the `credentials` collection, one record per key.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    store: Arc<LocalStore>,
}

impl CredentialStore {
    /// Creates a credential store over `store`.
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self { store }
    }

    fn read(&self, key: &str) -> SyncResult<Option<String>> {
        match self.store.get(CREDENTIALS, key) {
            Ok(record) => Ok(record
                .get("value")
                .and_then(Value::as_str)
                .map(str::to_string)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &str, value: Option<&str>) -> SyncResult<()> {
        match value {
            Some(value) => {
                self.store
                    .update(CREDENTIALS, json!({"key": key, "value": value}))?;
            }
            None => match self.store.delete(CREDENTIALS, key) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }

    /// Current bearer token.
    pub fn token(&self) -> SyncResult<Option<String>> {
        self.read(TOKEN)
    }

    /// Current refresh token.
    pub fn refresh_token(&self) -> SyncResult<Option<String>> {
        self.read(REFRESH_TOKEN)
    }

    /// The full token set, if both tokens are present.
    pub fn load(&self) -> SyncResult<Option<TokenSet>> {
        let (Some(token), Some(refresh_token)) = (self.token()?, self.refresh_token()?) else {
            return Ok(None);
        };
        Ok(Some(TokenSet {
            token,
            refresh_token,
            expires_at: self.read(EXPIRES_AT)?,
            refresh_token_expires_at: self.read(REFRESH_TOKEN_EXPIRES_AT)?,
        }))
    }

    /// Replaces all stored credentials.
    pub fn save(&self, tokens: &TokenSet) -> SyncResult<()> {
        self.write(TOKEN, Some(&tokens.token))?;
        self.write(REFRESH_TOKEN, Some(&tokens.refresh_token))?;
        self.write(EXPIRES_AT, tokens.expires_at.as_deref())?;
        self.write(REFRESH_TOKEN_EXPIRES_AT, tokens.refresh_token_expires_at.as_deref())?;
        tracing::debug!("credentials saved");
        Ok(())
    }

    /// Removes all stored credentials (logout).
    pub fn clear(&self) -> SyncResult<()> {
        self.store.clear(CREDENTIALS)?;
        Ok(())
    }
}

impl TokenSet {
    /// Parses a refresh or login response body.
    pub fn from_response(body: &Value) -> SyncResult<Self> {
        serde_json::from_value(body.clone())
            .map_err(|e| SyncError::Codec(format!("malformed token response: {e}")))
    }
}
