//! REST directory client backed by reqwest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::traits::{CredentialProvider, DirectoryClient};
use crate::config::DirectoryConfig;
use crate::domain::DirectoryRecord;
use crate::error::{DirectoryError, DirectoryResult};

/// Header enabling advanced (eventually consistent) queries.
const CONSISTENCY_LEVEL: &str = "ConsistencyLevel";

/// OData error envelope.
#[derive(Debug, Deserialize)]
struct ODataError {
    error: ODataErrorBody,
}

#[derive(Debug, Deserialize)]
struct ODataErrorBody {
    code: String,
    message: String,
}

/// Directory client talking to the REST host over HTTPS.
#[derive(Clone)]
pub struct HttpDirectory {
    http_client: reqwest::Client,
    base_url: String,
    scopes: Vec<String>,
    credential: Arc<dyn CredentialProvider>,
}

impl std::fmt::Debug for HttpDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDirectory")
            .field("base_url", &self.base_url)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl HttpDirectory {
    /// Create a client for the configured host.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(
        config: &DirectoryConfig,
        credential: Arc<dyn CredentialProvider>,
    ) -> DirectoryResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| DirectoryError::transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            scopes: config.scopes.clone(),
            credential,
        })
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a relative path; absolute URLs pass through.
    fn url(&self, path: &str) -> String {
        if path.starts_with("https://") || path.starts_with("http://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    async fn bearer_token(&self) -> DirectoryResult<String> {
        let token = self.credential.acquire_token(&self.scopes).await?;
        Ok(token.access_token)
    }

    /// Turn a non-2xx response into a `DirectoryError`.
    async fn error_from_response(response: reqwest::Response) -> DirectoryError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        match serde_json::from_str::<ODataError>(&body) {
            Ok(odata) => DirectoryError::http(
                status,
                format!("{}: {}", odata.error.code, odata.error.message),
            ),
            Err(_) if body.is_empty() => DirectoryError::http(status, format!("HTTP {status}")),
            Err(_) => DirectoryError::http(status, body),
        }
    }
}

#[async_trait]
impl DirectoryClient for HttpDirectory {
    #[instrument(skip(self))]
    async fn get(&self, path: &str) -> DirectoryResult<DirectoryRecord> {
        let token = self.bearer_token().await?;
        let url = self.url(path);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(&token)
            .header(CONSISTENCY_LEVEL, "eventual")
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), "Directory GET completed");
        if !status.is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let body: Value = response.json().await?;
        DirectoryRecord::from_value(body)
            .ok_or_else(|| DirectoryError::transport("response body is not a JSON object"))
    }

    #[instrument(skip(self, document))]
    async fn patch(&self, path: &str, document: &Value) -> DirectoryResult<()> {
        let token = self.bearer_token().await?;
        let url = self.url(path);

        let response = self
            .http_client
            .patch(&url)
            .bearer_auth(&token)
            .json(document)
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), "Directory PATCH completed");
        if !status.is_success() {
            return Err(Self::error_from_response(response).await);
        }

        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}
