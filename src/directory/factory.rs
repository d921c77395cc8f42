//! Directory client factory.
//!
//! Creates the HTTP directory client with the credential provider selected by
//! configuration.

use std::sync::Arc;

use tracing::debug;

use crate::config::DirectoryConfig;
use crate::directory::credential::{StaticCredential, TokenCacheFile};
use crate::directory::http::HttpDirectory;
use crate::directory::traits::{CredentialProvider, DirectoryClient};
use crate::error::DirectoryResult;

/// Select the credential provider.
///
/// A configured static token wins; otherwise the token cache of the invoking
/// user (`uid`) is used.
#[must_use]
pub fn create_credential(config: &DirectoryConfig, uid: u32) -> Arc<dyn CredentialProvider> {
    match &config.access_token {
        Some(token) => {
            debug!("Using configured access token");
            Arc::new(StaticCredential::new(token.clone()))
        }
        None => {
            let cache = TokenCacheFile::for_user(&config.token_cache_dir, uid);
            debug!(path = %cache.path().display(), "Using token cache file");
            Arc::new(cache)
        }
    }
}

/// Create a directory client based on configuration.
///
/// # Arguments
///
/// * `config` - Directory configuration
/// * `uid` - User the token cache belongs to
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be initialized.
pub fn create_directory(
    config: &DirectoryConfig,
    uid: u32,
) -> DirectoryResult<Arc<dyn DirectoryClient>> {
    let credential = create_credential(config, uid);
    let directory = HttpDirectory::new(config, credential)?;
    Ok(Arc::new(directory))
}
