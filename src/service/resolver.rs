//! Identity resolution facade.
//!
//! The only surface the host plugin layer sees. Every operation returns a
//! [`Lookup`]: a three-valued status plus the resolved record(s). Errors never
//! cross this boundary; they are folded into the status by
//! [`ResolveError::status`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, instrument, warn};

use crate::config::{AppConfig, UnprivilegedAccess};
use crate::directory::{DeadlineDirectory, DirectoryClient, DirectoryQuery};
use crate::domain::{
    DISPLAY_NAME, DirectoryRecord, IdKind, Lookup, LookupStatus, OBJECT_ID, PRINCIPAL_NAME,
    ResolvedGroup, ResolvedUser, ShadowRecord,
};
use crate::error::{DirectoryError, MappingError, ResolveError, Result};
use crate::service::allocator::IdAllocator;
use crate::service::mapper::AttributeMapper;
use crate::service::privilege::CallerPrivilege;
use crate::service::provisioning::Provisioner;
use crate::service::telemetry;

/// API version serving password metadata.
const SHADOW_API_VERSION: &str = "v1.0";

/// Membership expansion returning only what flattening needs.
const MEMBER_EXPAND: &str = "members($select=id,userPrincipalName)";

/// Whether a login name can be placed in a request path.
fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && !name.chars().any(|c| {
            c.is_whitespace()
                || c.is_control()
                || matches!(c, '/' | '\\' | '?' | '#' | '%' | '"' | '\'')
        })
}

/// Whether a group name can be placed in a quoted `$search` term.
///
/// Display names may contain spaces and punctuation; the query value is
/// percent-encoded, so only a double quote would end the term early.
fn is_valid_group_name(name: &str) -> bool {
    !name.is_empty() && !name.chars().any(|c| c.is_control() || c == '"')
}

/// Resolves POSIX identities from the directory.
pub struct IdentityResolver {
    /// Shared configuration.
    config: Arc<AppConfig>,
    /// Directory client.
    directory: Arc<dyn DirectoryClient>,
    /// Attribute mapper.
    mapper: Arc<AttributeMapper>,
    /// Identifier allocator.
    allocator: IdAllocator,
    /// Local account provisioning, when enabled.
    provisioner: Option<Provisioner>,
    /// Privilege of the calling process.
    privilege: CallerPrivilege,
}

impl IdentityResolver {
    /// Create a resolver.
    ///
    /// Every request made through `directory` is bounded by
    /// `resolver.operation_timeout_secs`.
    pub fn new(
        config: Arc<AppConfig>,
        directory: Arc<dyn DirectoryClient>,
        privilege: CallerPrivilege,
    ) -> Self {
        let limit = Duration::from_secs(config.resolver.operation_timeout_secs);
        let directory: Arc<dyn DirectoryClient> =
            Arc::new(DeadlineDirectory::new(directory, limit));
        let mapper = Arc::new(AttributeMapper::new(
            config.users.clone(),
            config.groups.clone(),
        ));
        let allocator = IdAllocator::new(directory.clone(), mapper.clone());

        Self {
            config,
            directory,
            mapper,
            allocator,
            provisioner: None,
            privilege,
        }
    }

    /// Enable local account provisioning on by-name lookups.
    #[must_use]
    pub fn with_provisioner(mut self, provisioner: Provisioner) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    // ---- facade operations ----

    /// Enumerate all in-scope users.
    #[instrument(skip(self))]
    pub async fn passwd_all(&self) -> Lookup<Vec<ResolvedUser>> {
        self.run("passwd_all", async { self.users_all().await.map(Some) })
            .await
    }

    /// Look up a user by login name.
    #[instrument(skip(self))]
    pub async fn passwd_by_name(&self, name: &str) -> Lookup<ResolvedUser> {
        self.run("passwd_by_name", self.user_by_name(name)).await
    }

    /// Look up a user by UID.
    #[instrument(skip(self))]
    pub async fn passwd_by_uid(&self, uid: u32) -> Lookup<ResolvedUser> {
        self.run("passwd_by_uid", self.user_by_uid(uid)).await
    }

    /// Enumerate all in-scope groups.
    #[instrument(skip(self))]
    pub async fn group_all(&self) -> Lookup<Vec<ResolvedGroup>> {
        self.run("group_all", async { self.groups_all().await.map(Some) })
            .await
    }

    /// Look up a group by name.
    #[instrument(skip(self))]
    pub async fn group_by_name(&self, name: &str) -> Lookup<ResolvedGroup> {
        self.run("group_by_name", self.group_named(name)).await
    }

    /// Look up a group by GID.
    #[instrument(skip(self))]
    pub async fn group_by_gid(&self, gid: u32) -> Lookup<ResolvedGroup> {
        self.run("group_by_gid", self.group_with_gid(gid)).await
    }

    /// Enumerate shadow entries for all in-scope users.
    #[instrument(skip(self))]
    pub async fn shadow_all(&self) -> Lookup<Vec<ShadowRecord>> {
        self.run("shadow_all", async { self.shadows_all().await.map(Some) })
            .await
    }

    /// Look up a shadow entry by login name.
    #[instrument(skip(self))]
    pub async fn shadow_by_name(&self, name: &str) -> Lookup<ShadowRecord> {
        self.run("shadow_by_name", self.shadow_named(name)).await
    }

    /// Run a lookup and fold its outcome.
    async fn run<T, F>(&self, op: &'static str, lookup: F) -> Lookup<T>
    where
        T: Default,
        F: Future<Output = Result<Option<T>>>,
    {
        let result = match lookup.await {
            Ok(Some(data)) => Lookup::success(data),
            Ok(None) => Lookup::not_found(),
            Err(e) => {
                let status = e.status();
                if status == LookupStatus::Unavailable {
                    error!(op, error = %e, "Lookup failed");
                } else {
                    debug!(op, error = %e, "Lookup resolved to not found");
                }
                Lookup::empty(status)
            }
        };

        telemetry::record_lookup(op, result.status);
        result
    }

    // ---- request paths ----

    fn user_query(&self, resource: impl Into<String>) -> DirectoryQuery {
        DirectoryQuery::new(self.config.users.storage.api_version(), resource)
    }

    fn group_query(&self, resource: impl Into<String>) -> DirectoryQuery {
        DirectoryQuery::new(self.config.groups.storage.api_version(), resource)
    }

    pub(crate) fn users_all_query(&self) -> DirectoryQuery {
        self.user_query("users")
            .filter(self.config.users.population_filter.as_str())
            .count()
            .select(self.mapper.user_fields())
    }

    pub(crate) fn user_by_name_query(&self, name: &str) -> DirectoryQuery {
        self.user_query(format!("users/{}", self.config.users.principal_name(name)))
            .select(self.mapper.user_fields())
    }

    pub(crate) fn user_by_uid_query(&self, uid: u32) -> DirectoryQuery {
        let path = self.config.users.storage.filter_path(IdKind::Uid);
        self.user_query("users")
            .filter(format!("{path} eq {uid}"))
            .count()
            .select(self.mapper.user_fields())
    }

    pub(crate) fn shadow_all_query(&self) -> DirectoryQuery {
        DirectoryQuery::new(SHADOW_API_VERSION, "users")
            .filter(self.config.users.population_filter.as_str())
            .count()
            .select(self.mapper.shadow_fields())
    }

    pub(crate) fn shadow_by_name_query(&self, name: &str) -> DirectoryQuery {
        DirectoryQuery::new(
            SHADOW_API_VERSION,
            format!("users/{}", self.config.users.principal_name(name)),
        )
        .select(self.mapper.shadow_fields())
    }

    pub(crate) fn groups_all_query(&self) -> DirectoryQuery {
        self.group_query("groups")
            .filter(self.config.groups.population_filter.as_str())
            .count()
            .expand(MEMBER_EXPAND)
            .select(self.mapper.group_fields())
    }

    pub(crate) fn group_search_query(&self, name: &str) -> DirectoryQuery {
        self.group_query("groups")
            .filter(self.config.groups.population_filter.as_str())
            .search(format!("\"{DISPLAY_NAME}:{name}\""))
            .select([OBJECT_ID, DISPLAY_NAME])
    }

    pub(crate) fn group_by_id_query(&self, object_id: &str) -> DirectoryQuery {
        self.group_query(format!("groups/{object_id}"))
            .expand(MEMBER_EXPAND)
            .select(self.mapper.group_fields())
    }

    pub(crate) fn group_by_gid_query(&self, gid: u32) -> DirectoryQuery {
        let path = self.config.groups.storage.filter_path(IdKind::Gid);
        let population = &self.config.groups.population_filter;
        let filter = if population.is_empty() {
            format!("{path} eq {gid}")
        } else {
            format!("{path} eq {gid} and {population}")
        };
        self.group_query("groups")
            .filter(filter)
            .count()
            .expand(MEMBER_EXPAND)
            .select(self.mapper.group_fields())
    }

    // ---- identifier policy ----

    /// Unprivileged callers configured to see only the sentinel.
    fn sentinel_only(&self) -> bool {
        !self.privilege.is_elevated()
            && self.config.resolver.unprivileged_access == UnprivilegedAccess::Sentinel
    }

    async fn settle(&self) {
        let delay = self.config.resolver.settle_delay_ms;
        if delay > 0 {
            debug!(delay_ms = delay, "Waiting for write-back to settle");
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    /// UID to report for a user record, allocating one when allowed.
    ///
    /// `None` means no identifier can be produced.
    async fn resolve_uid(&self, record: &DirectoryRecord) -> Result<Option<u32>> {
        if self.sentinel_only() {
            return Ok(self.config.resolver.sentinel_uid);
        }

        let stored = self.mapper.user_uid(record).unwrap_or_else(|e| {
            warn!(object_id = record.object_id().unwrap_or_default(), error = %e, "Ignoring malformed UID");
            None
        });
        if let Some(uid) = stored {
            return Ok(Some(uid));
        }

        if self.config.users.auto_allocate && self.privilege.is_elevated() {
            let object_id = record
                .object_id()
                .ok_or_else(|| MappingError::MissingAttribute(OBJECT_ID.to_string()))?;
            let uid = self.allocator.allocate_uid(object_id).await?;
            self.settle().await;
            return Ok(Some(uid));
        }

        Ok(self.config.resolver.sentinel_uid)
    }

    /// GID to report for a group record, allocating one when allowed.
    async fn resolve_gid(&self, record: &DirectoryRecord) -> Result<Option<u32>> {
        let stored = self.mapper.group_gid(record).unwrap_or_else(|e| {
            warn!(object_id = record.object_id().unwrap_or_default(), error = %e, "Ignoring malformed GID");
            None
        });
        if stored.is_some() {
            return Ok(stored);
        }

        if self.config.groups.auto_allocate && self.privilege.is_elevated() {
            let object_id = record
                .object_id()
                .ok_or_else(|| MappingError::MissingAttribute(OBJECT_ID.to_string()))?;
            let gid = self.allocator.allocate_gid(object_id).await?;
            self.settle().await;
            return Ok(Some(gid));
        }

        Ok(None)
    }

    // ---- users ----

    async fn users_all(&self) -> Result<Vec<ResolvedUser>> {
        let records = self
            .directory
            .list(&self.users_all_query().build())
            .await?;

        let mut users = Vec::with_capacity(records.len());
        for record in &records {
            if record.str_attr(PRINCIPAL_NAME).is_none() {
                warn!(object_id = record.object_id().unwrap_or_default(), "Skipping user without principal name");
                continue;
            }

            let uid = match self.resolve_uid(record).await {
                Ok(Some(uid)) => uid,
                Ok(None) => continue,
                Err(ResolveError::Mapping(e)) => {
                    warn!(error = %e, "Skipping unmappable user");
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.mapper.to_user(record, uid) {
                Ok(user) => users.push(user),
                Err(e) => warn!(error = %e, "Skipping unmappable user"),
            }
        }

        Ok(users)
    }

    async fn fetch_user(&self, name: &str) -> Result<DirectoryRecord> {
        Ok(self
            .directory
            .get(&self.user_by_name_query(name).build())
            .await?)
    }

    /// Fail unless the directory knows the user `name`.
    async fn confirm_user(&self, name: &str) -> Result<()> {
        self.fetch_user(name).await.map(|_| ())
    }

    async fn user_by_name(&self, name: &str) -> Result<Option<ResolvedUser>> {
        if !is_valid_name(name) {
            return Ok(None);
        }

        if self.config.provisioning.create_user
            && let Some(provisioner) = &self.provisioner
        {
            return provisioner
                .ensure_user(name, self.confirm_user(name))
                .await
                .map(Some);
        }

        let record = self.fetch_user(name).await?;
        match self.resolve_uid(&record).await? {
            Some(uid) => Ok(Some(self.mapper.to_user(&record, uid)?)),
            None => Ok(None),
        }
    }

    async fn user_by_uid(&self, uid: u32) -> Result<Option<ResolvedUser>> {
        if self.sentinel_only() {
            return Ok(None);
        }

        let records = self
            .directory
            .list(&self.user_by_uid_query(uid).build())
            .await?;
        match records.first() {
            Some(record) => Ok(Some(self.mapper.to_user(record, uid)?)),
            None => Ok(None),
        }
    }

    // ---- shadow ----

    async fn shadows_all(&self) -> Result<Vec<ShadowRecord>> {
        let records = self
            .directory
            .list(&self.shadow_all_query().build())
            .await?;

        Ok(records
            .iter()
            .filter_map(|record| match self.mapper.to_shadow(record) {
                Ok(shadow) => Some(shadow),
                Err(e) => {
                    warn!(error = %e, "Skipping unmappable shadow entry");
                    None
                }
            })
            .collect())
    }

    async fn shadow_named(&self, name: &str) -> Result<Option<ShadowRecord>> {
        if !is_valid_name(name) {
            return Ok(None);
        }

        let record = self
            .directory
            .get(&self.shadow_by_name_query(name).build())
            .await?;
        Ok(Some(self.mapper.to_shadow(&record)?))
    }

    // ---- groups ----

    async fn groups_all(&self) -> Result<Vec<ResolvedGroup>> {
        let records = self
            .directory
            .list(&self.groups_all_query().build())
            .await?;

        let mut groups = Vec::with_capacity(records.len());
        for record in &records {
            if record.str_attr(DISPLAY_NAME).is_none() {
                warn!(object_id = record.object_id().unwrap_or_default(), "Skipping group without display name");
                continue;
            }

            let gid = match self.resolve_gid(record).await {
                Ok(Some(gid)) => gid,
                Ok(None) => continue,
                Err(ResolveError::Mapping(e)) => {
                    warn!(error = %e, "Skipping unmappable group");
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.mapper.to_group(record, gid) {
                Ok(group) => groups.push(group),
                Err(e) => warn!(error = %e, "Skipping unmappable group"),
            }
        }

        Ok(groups)
    }

    /// Find the group whose display name is exactly `name`, with members.
    async fn find_group(&self, name: &str) -> Result<Option<DirectoryRecord>> {
        let candidates = self
            .directory
            .list(&self.group_search_query(name).build())
            .await?;

        let Some(object_id) = candidates
            .iter()
            .find(|c| c.str_attr(DISPLAY_NAME) == Some(name))
            .and_then(DirectoryRecord::object_id)
        else {
            return Ok(None);
        };

        let record = self
            .directory
            .get(&self.group_by_id_query(object_id).build())
            .await?;
        Ok(Some(record))
    }

    /// Fail unless the directory has a group named exactly `name`.
    async fn confirm_group(&self, name: &str) -> Result<()> {
        match self.find_group(name).await? {
            Some(_) => Ok(()),
            None => Err(DirectoryError::http(404, format!("group {name} not found")).into()),
        }
    }

    async fn group_named(&self, name: &str) -> Result<Option<ResolvedGroup>> {
        if !is_valid_group_name(name) {
            return Ok(None);
        }

        if self.config.provisioning.create_group
            && let Some(provisioner) = &self.provisioner
        {
            return provisioner
                .ensure_group(name, self.confirm_group(name))
                .await
                .map(Some);
        }

        let Some(record) = self.find_group(name).await? else {
            return Ok(None);
        };
        match self.resolve_gid(&record).await? {
            Some(gid) => Ok(Some(self.mapper.to_group(&record, gid)?)),
            None => Ok(None),
        }
    }

    async fn group_with_gid(&self, gid: u32) -> Result<Option<ResolvedGroup>> {
        let records = self
            .directory
            .list(&self.group_by_gid_query(gid).build())
            .await?;
        match records.first() {
            Some(record) => Ok(Some(self.mapper.to_group(record, gid)?)),
            None => Ok(None),
        }
    }
}
