//! Directory service configuration.

use std::path::PathBuf;

use config::ConfigError;
use serde::Deserialize;

/// Directory service connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DirectoryConfig {
    /// Base URL of the REST host, without a version segment.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Scopes requested from the credential provider.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Static bearer token. When unset the token cache file is used.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Directory holding the per-user token cache written by the credential
    /// provider.
    #[serde(default = "default_token_cache_dir")]
    pub token_cache_dir: PathBuf,
}

fn default_base_url() -> String {
    "https://graph.microsoft.com".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["https://graph.microsoft.com/.default".to_string()]
}

const fn default_request_timeout() -> u64 {
    30
}

fn default_token_cache_dir() -> PathBuf {
    PathBuf::from("/var/tmp")
}

impl DirectoryConfig {
    /// Validate the directory configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is not an absolute http(s) URL or the
    /// timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.base_url).map_err(|e| {
            ConfigError::Message(format!("directory.base_url is invalid: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Message(
                "directory.base_url must use http or https".to_string(),
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "directory.request_timeout_secs cannot be 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            scopes: default_scopes(),
            request_timeout_secs: default_request_timeout(),
            access_token: None,
            token_cache_dir: default_token_cache_dir(),
        }
    }
}
