//! Scripted in-memory directory for unit tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::traits::DirectoryClient;
use crate::domain::DirectoryRecord;
use crate::error::{DirectoryError, DirectoryResult};

/// Answers GETs from a table keyed by exact path and records PATCHes.
///
/// Unscripted paths answer 404.
#[derive(Debug, Default)]
pub struct ScriptedDirectory {
    responses: Mutex<HashMap<String, DirectoryResult<Value>>>,
    patch_failure: Mutex<Option<DirectoryError>>,
    gets: Mutex<Vec<String>>,
    patches: Mutex<Vec<(String, Value)>>,
}

impl ScriptedDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `path` with `body`.
    pub fn on_get(self, path: impl Into<String>, body: Value) -> Self {
        self.responses.lock().insert(path.into(), Ok(body));
        self
    }

    /// Answer `path` with a collection page holding `records`.
    pub fn on_list(self, path: impl Into<String>, records: Vec<Value>) -> Self {
        self.on_get(path, serde_json::json!({ "value": records }))
    }

    /// Fail `path` with `err`.
    pub fn fail_get(self, path: impl Into<String>, err: DirectoryError) -> Self {
        self.responses.lock().insert(path.into(), Err(err));
        self
    }

    /// Fail every PATCH with `err`.
    pub fn fail_patches(self, err: DirectoryError) -> Self {
        *self.patch_failure.lock() = Some(err);
        self
    }

    /// Paths requested so far.
    pub fn gets(&self) -> Vec<String> {
        self.gets.lock().clone()
    }

    /// PATCHes received so far.
    pub fn patches(&self) -> Vec<(String, Value)> {
        self.patches.lock().clone()
    }
}

#[async_trait]
impl DirectoryClient for ScriptedDirectory {
    async fn get(&self, path: &str) -> DirectoryResult<DirectoryRecord> {
        self.gets.lock().push(path.to_string());
        let response = self.responses.lock().get(path).cloned();
        match response {
            Some(Ok(body)) => DirectoryRecord::from_value(body)
                .ok_or_else(|| DirectoryError::transport("scripted body is not an object")),
            Some(Err(err)) => Err(err),
            None => Err(DirectoryError::http(404, format!("unscripted path {path}"))),
        }
    }

    async fn patch(&self, path: &str, document: &Value) -> DirectoryResult<()> {
        if let Some(err) = self.patch_failure.lock().clone() {
            return Err(err);
        }
        self.patches.lock().push((path.to_string(), document.clone()));
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_list_follows_next_link() {
        let directory = ScriptedDirectory::new()
            .on_get(
                "/v1.0/users",
                json!({
                    "value": [{ "id": "1" }, { "id": "2" }],
                    "@odata.nextLink": "https://graph.example.com/v1.0/users?$skiptoken=abc"
                }),
            )
            .on_list(
                "https://graph.example.com/v1.0/users?$skiptoken=abc",
                vec![json!({ "id": "3" }), json!("not an object")],
            );

        let records = directory.list("/v1.0/users").await.unwrap();
        let ids: Vec<_> = records.iter().filter_map(DirectoryRecord::object_id).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(directory.gets().len(), 2);
    }

    #[tokio::test]
    async fn test_list_requires_value_array() {
        let directory = ScriptedDirectory::new().on_get("/v1.0/users", json!({ "id": "1" }));
        let err = directory.list("/v1.0/users").await.unwrap_err();
        assert_eq!(err.status, 0);
    }

    #[tokio::test]
    async fn test_list_propagates_page_failure() {
        let directory = ScriptedDirectory::new()
            .fail_get("/v1.0/groups", DirectoryError::http(503, "busy"));
        let err = directory.list("/v1.0/groups").await.unwrap_err();
        assert_eq!(err.status, 503);
        assert!(err.retryable);
    }

    #[tokio::test]
    async fn test_unscripted_path_is_not_found() {
        let directory = ScriptedDirectory::new();
        let err = directory.get("/v1.0/users/x").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(directory.backend_name(), "scripted");
    }
}
