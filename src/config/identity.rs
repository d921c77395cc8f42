//! User, group and resolver policy configuration.

use config::ConfigError;
use serde::Deserialize;

use crate::domain::{AllocationRange, IdentityAttributeMode};

/// Placeholder replaced by the short name in templates.
pub const TEMPLATE_PLACEHOLDER: &str = "{}";

/// User resolution configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    /// Where UID/GID live on user objects.
    #[serde(default)]
    pub storage: IdentityAttributeMode,

    /// Range for generated UIDs.
    #[serde(default)]
    pub uid_range: AllocationRange,

    /// GID assigned when a user object carries none.
    #[serde(default = "default_gid")]
    pub default_gid: u32,

    /// Allocate and persist a UID when a user has none.
    #[serde(default)]
    pub auto_allocate: bool,

    /// Filter selecting the users in scope for enumeration.
    #[serde(default = "default_user_filter")]
    pub population_filter: String,

    /// Principal name template, e.g. `{}@example.com`.
    #[serde(default = "default_domain_template")]
    pub domain_template: String,

    /// Home directory template.
    #[serde(default = "default_home_template")]
    pub home_template: String,

    /// Login shell.
    #[serde(default = "default_shell")]
    pub shell: String,
}

const fn default_gid() -> u32 {
    100
}

fn default_user_filter() -> String {
    "assignedLicenses/$count ne 0".to_string()
}

fn default_domain_template() -> String {
    TEMPLATE_PLACEHOLDER.to_string()
}

fn default_home_template() -> String {
    "/home/{}".to_string()
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

impl UserConfig {
    /// Expand the domain template into a principal name.
    #[must_use]
    pub fn principal_name(&self, name: &str) -> String {
        self.domain_template.replacen(TEMPLATE_PLACEHOLDER, name, 1)
    }

    /// Expand the home directory template.
    #[must_use]
    pub fn home_directory(&self, username: &str) -> String {
        self.home_template.replace(TEMPLATE_PLACEHOLDER, username)
    }

    /// Validate the user configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the range, templates or attribute names are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.uid_range
            .validate()
            .map_err(|e| ConfigError::Message(format!("users.uid_range: {e}")))?;
        validate_storage("users.storage", &self.storage)?;
        if !self.domain_template.contains(TEMPLATE_PLACEHOLDER) {
            return Err(ConfigError::Message(
                "users.domain_template must contain {}".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            storage: IdentityAttributeMode::default(),
            uid_range: AllocationRange::default(),
            default_gid: default_gid(),
            auto_allocate: false,
            population_filter: default_user_filter(),
            domain_template: default_domain_template(),
            home_template: default_home_template(),
            shell: default_shell(),
        }
    }
}

/// Group resolution configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupConfig {
    /// Where the GID lives on group objects.
    #[serde(default)]
    pub storage: IdentityAttributeMode,

    /// Range for generated GIDs.
    #[serde(default)]
    pub gid_range: AllocationRange,

    /// Allocate and persist a GID when a group has none.
    #[serde(default)]
    pub auto_allocate: bool,

    /// Filter selecting the groups in scope for enumeration.
    #[serde(default = "default_group_filter")]
    pub population_filter: String,
}

fn default_group_filter() -> String {
    "securityEnabled eq true".to_string()
}

impl GroupConfig {
    /// Validate the group configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the range or attribute names are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.gid_range
            .validate()
            .map_err(|e| ConfigError::Message(format!("groups.gid_range: {e}")))?;
        validate_storage("groups.storage", &self.storage)
    }
}

impl Default for GroupConfig {
    fn default() -> Self {
        Self {
            storage: IdentityAttributeMode::default(),
            gid_range: AllocationRange::default(),
            auto_allocate: false,
            population_filter: default_group_filter(),
        }
    }
}

fn validate_storage(section: &str, storage: &IdentityAttributeMode) -> Result<(), ConfigError> {
    let (set, uid, gid) = match storage {
        IdentityAttributeMode::NativeAttribute {
            uid_attribute,
            gid_attribute,
        } => (None, uid_attribute, gid_attribute),
        IdentityAttributeMode::CustomAttributeSet {
            attribute_set,
            uid_attribute,
            gid_attribute,
        } => (Some(attribute_set), uid_attribute, gid_attribute),
    };
    if set.is_some_and(String::is_empty) {
        return Err(ConfigError::Message(format!(
            "{section}.attribute_set cannot be empty"
        )));
    }
    if uid.is_empty() || gid.is_empty() {
        return Err(ConfigError::Message(format!(
            "{section} attribute names cannot be empty"
        )));
    }
    Ok(())
}

/// What an unprivileged caller sees for identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnprivilegedAccess {
    /// Stored identifiers are readable; nothing is written.
    #[default]
    ReadOnly,
    /// Every user reports the sentinel UID.
    Sentinel,
}

/// Resolver policy configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// UID reported when none can be resolved. `None` omits such users.
    #[serde(default = "default_sentinel_uid")]
    pub sentinel_uid: Option<u32>,

    /// Identifier visibility for unprivileged callers.
    #[serde(default)]
    pub unprivileged_access: UnprivilegedAccess,

    /// Pause after each identifier write-back, in milliseconds.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Upper bound on a single directory request, token acquisition
    /// included, in seconds. Settle delays are not counted against it.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,
}

#[allow(clippy::unnecessary_wraps)]
const fn default_sentinel_uid() -> Option<u32> {
    Some(65_534)
}

const fn default_settle_delay() -> u64 {
    5_000
}

const fn default_operation_timeout() -> u64 {
    60
}

/// Longest accepted settle delay, in milliseconds.
pub const MAX_SETTLE_DELAY_MS: u64 = 60_000;

impl ResolverConfig {
    /// Validate the resolver configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the timeout is zero or the settle delay exceeds
    /// [`MAX_SETTLE_DELAY_MS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.operation_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "resolver.operation_timeout_secs cannot be 0".to_string(),
            ));
        }
        if self.settle_delay_ms > MAX_SETTLE_DELAY_MS {
            return Err(ConfigError::Message(format!(
                "resolver.settle_delay_ms cannot exceed {MAX_SETTLE_DELAY_MS}"
            )));
        }
        Ok(())
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            sentinel_uid: default_sentinel_uid(),
            unprivileged_access: UnprivilegedAccess::ReadOnly,
            settle_delay_ms: default_settle_delay(),
            operation_timeout_secs: default_operation_timeout(),
        }
    }
}
