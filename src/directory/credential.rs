//! Credential providers handing bearer tokens to the HTTP directory client.
//!
//! Token acquisition itself (device code, client secret, refresh) is done by
//! an external component. This module only consumes what it produces: either
//! a token placed directly in configuration, or the per-user JSON cache file
//! the external provider maintains.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use tracing::debug;

use super::traits::{AccessToken, CredentialProvider};
use crate::error::CredentialError;

/// Lifetime reported for a configured static token.
const STATIC_TOKEN_LIFETIME_SECS: i64 = 3_600;

/// A bearer token supplied through configuration.
#[derive(Debug, Clone)]
pub struct StaticCredential {
    token: String,
}

impl StaticCredential {
    /// Wrap a configured token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredential {
    async fn acquire_token(&self, _scopes: &[String]) -> Result<AccessToken, CredentialError> {
        if self.token.is_empty() {
            return Err(CredentialError::NotConfigured);
        }
        Ok(AccessToken {
            access_token: self.token.clone(),
            expires_at: Utc::now() + Duration::seconds(STATIC_TOKEN_LIFETIME_SECS),
        })
    }
}

/// Token cache file written by the external credential provider.
///
/// The file holds one serialized [`AccessToken`]. A token read from disk is
/// kept in memory and reused until it expires.
#[derive(Debug)]
pub struct TokenCacheFile {
    path: PathBuf,
    cached: RwLock<Option<AccessToken>>,
}

impl TokenCacheFile {
    /// Use the cache file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: RwLock::new(None),
        }
    }

    /// Use the cache file of the given user inside `dir`.
    #[must_use]
    pub fn for_user(dir: &Path, uid: u32) -> Self {
        Self::new(Self::cache_path(dir, uid))
    }

    /// Location of a user's cache file.
    #[must_use]
    pub fn cache_path(dir: &Path, uid: u32) -> PathBuf {
        dir.join(format!("cloudid-nss_{uid}_.json"))
    }

    /// Path of the cache file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<AccessToken, CredentialError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(CredentialError::NotConfigured);
            }
            Err(e) => {
                return Err(CredentialError::Cache(format!(
                    "{}: {e}",
                    self.path.display()
                )));
            }
        };

        serde_json::from_str(&content)
            .map_err(|e| CredentialError::Cache(format!("{}: {e}", self.path.display())))
    }
}

#[async_trait]
impl CredentialProvider for TokenCacheFile {
    async fn acquire_token(&self, _scopes: &[String]) -> Result<AccessToken, CredentialError> {
        if let Some(token) = self.cached.read().as_ref()
            && !token.is_expired()
        {
            return Ok(token.clone());
        }

        let token = self.read_file().await?;
        if token.is_expired() {
            return Err(CredentialError::Expired(token.expires_at.to_rfc3339()));
        }

        debug!(path = %self.path.display(), expires_at = %token.expires_at, "Loaded cached token");
        *self.cached.write() = Some(token.clone());
        Ok(token)
    }
}
