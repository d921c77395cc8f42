//! Directory trait definitions.
//!
//! These traits define the interface to the remote directory service and its
//! credential provider, so the resolver can run against the real REST API or
//! an in-process fake without changing business logic.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::DirectoryRecord;
use crate::error::{CredentialError, DirectoryError, DirectoryResult};

/// Attribute of a collection page carrying its records.
pub const COLLECTION_VALUE: &str = "value";

/// Attribute of a collection page linking to the next page.
pub const NEXT_LINK: &str = "@odata.nextLink";

/// Upper bound on pages followed by a single listing.
const MAX_PAGES: usize = 1_000;

/// Authenticated access to the directory service.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Fetch one record, or one collection page, by relative path.
    ///
    /// The path already carries any query string. Absolute URLs (as found in
    /// page links) are accepted as-is.
    async fn get(&self, path: &str) -> DirectoryResult<DirectoryRecord>;

    /// Apply a partial attribute update to one directory object.
    ///
    /// Only the attributes present in `document` are modified.
    async fn patch(&self, path: &str, document: &Value) -> DirectoryResult<()>;

    /// Fetch every record of a collection, following page links.
    async fn list(&self, path: &str) -> DirectoryResult<Vec<DirectoryRecord>> {
        let mut records = Vec::new();
        let mut next = Some(path.to_string());
        let mut pages = 0;

        while let Some(page_path) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                return Err(DirectoryError::transport(format!(
                    "collection exceeded {MAX_PAGES} pages"
                )));
            }

            let page = self.get(&page_path).await?;
            let values = page.array_attr(COLLECTION_VALUE).ok_or_else(|| {
                DirectoryError::transport("collection response has no value array")
            })?;
            records.extend(
                values
                    .iter()
                    .cloned()
                    .filter_map(DirectoryRecord::from_value),
            );
            next = page.str_attr(NEXT_LINK).map(String::from);
        }

        Ok(records)
    }

    /// Get the backend name.
    fn backend_name(&self) -> &'static str;
}

/// A bearer token with its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// Opaque bearer token.
    pub access_token: String,
    /// When the token stops being valid.
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    /// Whether the token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// External collaborator that hands out bearer tokens.
///
/// Implementations prefer a cached token while it is still valid.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Return a token valid for the given scopes.
    async fn acquire_token(&self, scopes: &[String]) -> Result<AccessToken, CredentialError>;
}
