//! Identifier allocator.
//!
//! Picks a UID or GID that no in-scope directory object uses yet and persists
//! it on the target object. The used set is read immediately before the pick,
//! so uniqueness holds only as of that read; concurrent allocators in other
//! processes can still race.

use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::directory::{DirectoryClient, DirectoryQuery};
use crate::domain::{AllocationRange, IdKind, IdentityAttributeMode, OBJECT_ID};
use crate::error::{ResolveError, Result};
use crate::service::mapper::{AttributeMapper, extract_id};
use crate::service::telemetry;

/// Random draws attempted before falling back to the explicit free list.
pub const MAX_RANDOM_DRAWS: usize = 64;

/// Pick a value in `range` that is not in `used`.
///
/// Draws uniformly at random first; after [`MAX_RANDOM_DRAWS`] collisions the
/// free values are enumerated and one is chosen uniformly among them. Returns
/// `None` when every value in the range is used.
pub fn pick_unused<R: Rng + ?Sized>(
    range: AllocationRange,
    used: &HashSet<u32>,
    rng: &mut R,
) -> Option<u32> {
    let used_in_range = used.iter().filter(|id| range.contains(**id)).count();
    if used_in_range as u64 >= range.size() {
        return None;
    }

    for _ in 0..MAX_RANDOM_DRAWS {
        let candidate = rng.random_range(range.min..=range.max);
        if !used.contains(&candidate) {
            return Some(candidate);
        }
    }

    let free: Vec<u32> = range.iter().filter(|id| !used.contains(id)).collect();
    if free.is_empty() {
        return None;
    }
    Some(free[rng.random_range(0..free.len())])
}

/// Allocates identifiers against the directory.
pub struct IdAllocator {
    /// Directory client.
    directory: Arc<dyn DirectoryClient>,
    /// Attribute mapper holding both storage shapes.
    mapper: Arc<AttributeMapper>,
}

impl IdAllocator {
    /// Create a new allocator.
    pub fn new(directory: Arc<dyn DirectoryClient>, mapper: Arc<AttributeMapper>) -> Self {
        Self { directory, mapper }
    }

    fn settings(&self, kind: IdKind) -> (&IdentityAttributeMode, AllocationRange, &str, &str) {
        match kind {
            IdKind::Uid => {
                let users = self.mapper.users();
                (
                    &users.storage,
                    users.uid_range,
                    "users",
                    users.population_filter.as_str(),
                )
            }
            IdKind::Gid => {
                let groups = self.mapper.groups();
                (
                    &groups.storage,
                    groups.gid_range,
                    "groups",
                    groups.population_filter.as_str(),
                )
            }
        }
    }

    /// Path enumerating every in-scope object with its stored identifier.
    #[must_use]
    pub fn used_ids_query(&self, kind: IdKind) -> DirectoryQuery {
        let (storage, _, resource, filter) = self.settings(kind);
        let mut fields = vec![OBJECT_ID.to_string()];
        fields.extend(storage.select_fields());

        DirectoryQuery::new(storage.api_version(), resource)
            .filter(filter)
            .count()
            .select(fields)
    }

    /// Collect the identifiers already in use.
    ///
    /// Malformed values are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be enumerated.
    pub async fn used_ids(&self, kind: IdKind) -> Result<HashSet<u32>> {
        let (storage, _, _, _) = self.settings(kind);
        let records = self
            .directory
            .list(&self.used_ids_query(kind).build())
            .await?;

        let mut used = HashSet::with_capacity(records.len());
        for record in &records {
            match extract_id(record, storage, kind) {
                Ok(Some(id)) => {
                    used.insert(id);
                }
                Ok(None) => {}
                Err(e) => warn!(
                    object_id = record.object_id().unwrap_or_default(),
                    error = %e,
                    "Ignoring malformed identifier"
                ),
            }
        }

        debug!(kind = %kind, used = used.len(), "Collected used identifiers");
        Ok(used)
    }

    /// Allocate a UID for the user with the given object id and persist it.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory fails or the range is exhausted.
    pub async fn allocate_uid(&self, object_id: &str) -> Result<u32> {
        self.allocate(IdKind::Uid, object_id).await
    }

    /// Allocate a GID for the group with the given object id and persist it.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory fails or the range is exhausted.
    pub async fn allocate_gid(&self, object_id: &str) -> Result<u32> {
        self.allocate(IdKind::Gid, object_id).await
    }

    async fn allocate(&self, kind: IdKind, object_id: &str) -> Result<u32> {
        let used = self.used_ids(kind).await?;
        let (storage, range, resource, _) = self.settings(kind);

        let Some(value) = pick_unused(range, &used, &mut rand::rng()) else {
            telemetry::record_exhausted(kind);
            return Err(ResolveError::AllocationExhausted {
                kind,
                min: range.min,
                max: range.max,
            });
        };

        let path = DirectoryQuery::new(storage.api_version(), format!("{resource}/{object_id}"));
        let document = match kind {
            IdKind::Uid => self.mapper.uid_document(value),
            IdKind::Gid => self.mapper.gid_document(value),
        };
        self.directory.patch(&path.build(), &document).await?;

        telemetry::record_allocation(kind);
        info!(kind = %kind, object_id, value, "Allocated identifier");
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GroupConfig, UserConfig};
    use crate::directory::scripted::ScriptedDirectory;
    use crate::error::DirectoryError;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;

    fn mapper(range: AllocationRange) -> Arc<AttributeMapper> {
        Arc::new(AttributeMapper::new(
            UserConfig {
                uid_range: range,
                ..Default::default()
            },
            GroupConfig {
                gid_range: range,
                ..Default::default()
            },
        ))
    }

    #[test]
    fn test_pick_unused_avoids_used() {
        let range = AllocationRange::new(10_000, 10_005);
        let used: HashSet<u32> = [10_000, 10_002, 10_004].into_iter().collect();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let value = pick_unused(range, &used, &mut rng).unwrap();
            assert!(range.contains(value));
            assert!(!used.contains(&value));
        }
    }

    #[test]
    fn test_pick_unused_single_free_value() {
        let range = AllocationRange::new(1, 1_000);
        let used: HashSet<u32> = (1..=1_000).filter(|v| *v != 777).collect();
        let mut rng = StdRng::seed_from_u64(1);

        assert_eq!(pick_unused(range, &used, &mut rng), Some(777));
    }

    #[test]
    fn test_pick_unused_exhausted() {
        let range = AllocationRange::new(5, 7);
        let used: HashSet<u32> = [5, 6, 7].into_iter().collect();
        let mut rng = StdRng::seed_from_u64(3);

        assert_eq!(pick_unused(range, &used, &mut rng), None);
    }

    #[test]
    fn test_pick_unused_ignores_out_of_range_ids() {
        let range = AllocationRange::new(5, 6);
        let used: HashSet<u32> = [1, 2, 3, 5].into_iter().collect();
        let mut rng = StdRng::seed_from_u64(9);

        assert_eq!(pick_unused(range, &used, &mut rng), Some(6));
    }

    #[tokio::test]
    async fn test_allocate_uid_persists_unused_value() {
        let range = AllocationRange::new(10_000, 10_005);
        let mapper = mapper(range);
        let directory = Arc::new(ScriptedDirectory::new());
        let query = IdAllocator::new(directory.clone(), mapper.clone())
            .used_ids_query(IdKind::Uid)
            .build();

        let directory = Arc::new(ScriptedDirectory::new().on_list(
            query,
            vec![
                json!({ "id": "a", "uidNumber": 10_000 }),
                json!({ "id": "b", "uidNumber": 2001 }),
                json!({ "id": "c", "uidNumber": "garbage" }),
                json!({ "id": "d" }),
            ],
        ));
        let allocator = IdAllocator::new(directory.clone(), mapper);

        let uid = allocator.allocate_uid("d").await.unwrap();
        assert!((10_001..=10_005).contains(&uid));

        let patches = directory.patches();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].0, "/v1.0/users/d");
        assert_eq!(patches[0].1, json!({ "uidNumber": uid }));
    }

    #[tokio::test]
    async fn test_allocate_gid_exhausted() {
        let range = AllocationRange::new(20_000, 20_001);
        let mapper = mapper(range);
        let query = IdAllocator::new(Arc::new(ScriptedDirectory::new()), mapper.clone())
            .used_ids_query(IdKind::Gid)
            .build();

        let directory = Arc::new(ScriptedDirectory::new().on_list(
            query,
            vec![
                json!({ "id": "g1", "gidNumber": 20_000 }),
                json!({ "id": "g2", "gidNumber": 20_001 }),
            ],
        ));
        let allocator = IdAllocator::new(directory.clone(), mapper);

        let err = allocator.allocate_gid("g3").await.unwrap_err();
        assert!(matches!(
            err,
            ResolveError::AllocationExhausted {
                kind: IdKind::Gid,
                min: 20_000,
                max: 20_001
            }
        ));
        assert!(directory.patches().is_empty());
    }

    #[tokio::test]
    async fn test_allocate_propagates_patch_failure() {
        let range = AllocationRange::new(10_000, 10_005);
        let mapper = mapper(range);
        let query = IdAllocator::new(Arc::new(ScriptedDirectory::new()), mapper.clone())
            .used_ids_query(IdKind::Uid)
            .build();

        let directory = Arc::new(
            ScriptedDirectory::new()
                .on_list(query, vec![])
                .fail_patches(DirectoryError::http(403, "forbidden")),
        );
        let allocator = IdAllocator::new(directory, mapper);

        let err = allocator.allocate_uid("x").await.unwrap_err();
        assert!(matches!(err, ResolveError::Directory(ref e) if e.status == 403));
    }

    #[test]
    fn test_custom_mode_query_uses_beta() {
        let mapper = Arc::new(AttributeMapper::new(
            UserConfig {
                storage: IdentityAttributeMode::custom("posix", "uidNumber", "gidNumber"),
                ..Default::default()
            },
            GroupConfig::default(),
        ));
        let allocator = IdAllocator::new(Arc::new(ScriptedDirectory::new()), mapper);

        let path = allocator.used_ids_query(IdKind::Uid).build();
        assert!(path.starts_with("/beta/users?$filter="));
        assert!(path.ends_with("&$count=true&$select=id%2CcustomSecurityAttributes"));
    }
}
