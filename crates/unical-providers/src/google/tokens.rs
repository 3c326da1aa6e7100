//! OAuth token storage.
//!
//! Tokens are kept in the "authorized user" JSON layout used by Google's
//! client libraries, so token files written by other tools load unchanged.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};

use super::config::OAuthCredentials;

/// Access tokens are treated as expired this long before their deadline.
const EXPIRY_SKEW_SECS: i64 = 60;

/// A stored OAuth token set.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// The access token for API requests.
    #[serde(alias = "access_token")]
    pub token: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    #[serde(default)]
    pub scopes: Vec<String>,

    /// When the access token expires. `None` means unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl fmt::Debug for TokenInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenInfo")
            .field("token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl TokenInfo {
    /// Creates a token set from a token endpoint response.
    pub fn new(
        token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            token: token.into(),
            refresh_token,
            token_uri: None,
            client_id: None,
            client_secret: None,
            scopes,
            expiry: expires_in_secs.map(|secs| Utc::now() + Duration::seconds(secs)),
        }
    }

    /// Records the client the token was issued to, so a refresh can happen
    /// without the client secrets file.
    pub fn with_client(mut self, credentials: &OAuthCredentials, token_uri: &str) -> Self {
        self.client_id = Some(credentials.client_id.clone());
        self.client_secret = Some(credentials.client_secret.clone());
        self.token_uri = Some(token_uri.to_string());
        self
    }

    /// Client credentials embedded in the token file, if complete.
    pub fn embedded_credentials(&self) -> Option<OAuthCredentials> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) => Some(OAuthCredentials::new(id, secret)),
            _ => None,
        }
    }

    /// Returns true if the access token is expired or about to expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry
            .is_some_and(|expiry| now + Duration::seconds(EXPIRY_SKEW_SECS) >= expiry)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Replaces the access token after a refresh.
    ///
    /// Google only sometimes rotates the refresh token; the old one is kept
    /// when none is returned.
    pub fn refreshed(
        &mut self,
        token: impl Into<String>,
        expires_in_secs: Option<i64>,
        refresh_token: Option<String>,
    ) {
        self.token = token.into();
        self.expiry = expires_in_secs.map(|secs| Utc::now() + Duration::seconds(secs));
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
    }
}

/// File-backed token storage.
#[derive(Debug, Clone)]
pub struct TokenStorage {
    path: PathBuf,
}

impl TokenStorage {
    /// Creates a new token storage at the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the token file. Returns `Ok(None)` if it does not exist.
    pub fn load(&self) -> ProviderResult<Option<TokenInfo>> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "No token file");
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            ProviderError::configuration(format!(
                "failed to read token file {}: {e}",
                self.path.display()
            ))
        })?;
        let tokens: TokenInfo = serde_json::from_str(&content).map_err(|e| {
            ProviderError::configuration(format!(
                "failed to parse token file {}: {e}",
                self.path.display()
            ))
        })?;

        debug!(path = %self.path.display(), "Loaded token file");
        Ok(Some(tokens))
    }

    /// Writes the token file atomically with mode 0600.
    pub fn save(&self, tokens: &TokenInfo) -> ProviderResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                ProviderError::configuration(format!("failed to create token directory: {e}"))
            })?;
        }

        let content = serde_json::to_string_pretty(tokens).map_err(|e| {
            ProviderError::internal(format!("failed to serialize tokens: {e}")).with_source(e)
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &content).map_err(|e| {
            ProviderError::configuration(format!("failed to write token file: {e}"))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600)).map_err(|e| {
                ProviderError::configuration(format!("failed to restrict token file: {e}"))
            })?;
        }

        fs::rename(&temp_path, &self.path).map_err(|e| {
            ProviderError::configuration(format!("failed to rename token file: {e}"))
        })?;

        info!(path = %self.path.display(), "Saved token file");
        Ok(())
    }

    /// Returns the token storage path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
