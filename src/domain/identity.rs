//! Resolved POSIX identity records and lookup results.

use serde::{Deserialize, Serialize};

/// Password field reported for passwd and group entries.
pub const SHADOWED_PASSWORD: &str = "x";

/// Password field reported for shadow entries. Directory accounts never
/// carry a local password hash.
pub const LOCKED_PASSWORD: &str = "*";

/// Outcome of a lookup as seen by the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupStatus {
    /// The record(s) were resolved.
    Success,
    /// No matching record exists.
    #[default]
    NotFound,
    /// The directory could not be consulted.
    Unavailable,
}

impl LookupStatus {
    /// Metric label for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NotFound => "notfound",
            Self::Unavailable => "unavailable",
        }
    }
}

impl std::fmt::Display for LookupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status plus payload returned by every facade operation.
///
/// On `NotFound` and `Unavailable` the payload is the empty default, never a
/// partially populated record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lookup<T> {
    /// Lookup outcome.
    pub status: LookupStatus,
    /// Resolved record(s).
    pub data: T,
}

impl<T> Lookup<T> {
    /// Create a success result.
    pub const fn success(data: T) -> Self {
        Self {
            status: LookupStatus::Success,
            data,
        }
    }

    /// Whether the lookup succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == LookupStatus::Success
    }
}

impl<T: Default> Lookup<T> {
    /// Create a result with the given status and an empty payload.
    #[must_use]
    pub fn empty(status: LookupStatus) -> Self {
        Self {
            status,
            data: T::default(),
        }
    }

    /// Create a not-found result.
    #[must_use]
    pub fn not_found() -> Self {
        Self::empty(LookupStatus::NotFound)
    }

    /// Create an unavailable result.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::empty(LookupStatus::Unavailable)
    }
}

/// A user resolved into passwd fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedUser {
    /// Login name (principal name up to the first `@`).
    pub username: String,
    /// Numeric user id.
    pub uid: u32,
    /// Primary group id.
    pub gid: u32,
    /// GECOS / display name.
    pub display_name: String,
    /// Home directory.
    pub home_directory: String,
    /// Login shell.
    pub shell: String,
}

impl ResolvedUser {
    /// Render as a `passwd(5)` line.
    #[must_use]
    pub fn to_passwd_line(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}:{}",
            self.username,
            SHADOWED_PASSWORD,
            self.uid,
            self.gid,
            self.display_name,
            self.home_directory,
            self.shell
        )
    }
}

/// A group resolved into group fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedGroup {
    /// Group name.
    pub groupname: String,
    /// Numeric group id.
    pub gid: u32,
    /// Member login names, in directory order.
    pub members: Vec<String>,
}

impl ResolvedGroup {
    /// Render as a `group(5)` line.
    #[must_use]
    pub fn to_group_line(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.groupname,
            SHADOWED_PASSWORD,
            self.gid,
            self.members.join(",")
        )
    }
}

/// Password aging metadata for a directory user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowRecord {
    /// Login name.
    pub username: String,
    /// Days since the epoch of the last password change, if known.
    pub last_change_day: Option<i64>,
    /// Minimum days between changes.
    pub min_change_days: i64,
    /// Maximum days a password stays valid.
    pub max_change_days: i64,
    /// Days of warning before expiry.
    pub warn_days: i64,
    /// Account expiration day.
    pub expiration_day: i64,
}

impl ShadowRecord {
    /// Render as a `shadow(5)` line. The inactivity and reserved fields are
    /// left empty.
    #[must_use]
    pub fn to_shadow_line(&self) -> String {
        let last_change = self
            .last_change_day
            .map(|d| d.to_string())
            .unwrap_or_default();
        format!(
            "{}:{}:{}:{}:{}:{}::{}:",
            self.username,
            LOCKED_PASSWORD,
            last_change,
            self.min_change_days,
            self.max_change_days,
            self.warn_days,
            self.expiration_day
        )
    }
}
