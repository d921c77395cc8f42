//! Per-request deadline for directory operations.
//!
//! Every GET, PATCH and collection page is bounded on its own, so a lookup
//! that performs many requests (or sleeps between them) is never cut short
//! as a whole.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::directory::traits::DirectoryClient;
use crate::domain::DirectoryRecord;
use crate::error::{DirectoryError, DirectoryResult};

/// Directory client that fails a request once it exceeds `limit`.
pub struct DeadlineDirectory {
    inner: Arc<dyn DirectoryClient>,
    limit: Duration,
}

impl DeadlineDirectory {
    /// Wrap `inner`, bounding each request by `limit`.
    pub fn new(inner: Arc<dyn DirectoryClient>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    fn expired(&self, method: &str, path: &str) -> DirectoryError {
        DirectoryError::transport(format!(
            "{method} {path} exceeded {}s",
            self.limit.as_secs()
        ))
    }
}

#[async_trait]
impl DirectoryClient for DeadlineDirectory {
    async fn get(&self, path: &str) -> DirectoryResult<DirectoryRecord> {
        tokio::time::timeout(self.limit, self.inner.get(path))
            .await
            .map_err(|_: tokio::time::error::Elapsed| self.expired("GET", path))?
    }

    async fn patch(&self, path: &str, document: &Value) -> DirectoryResult<()> {
        tokio::time::timeout(self.limit, self.inner.patch(path, document))
            .await
            .map_err(|_: tokio::time::error::Elapsed| self.expired("PATCH", path))?
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}
