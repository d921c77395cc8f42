//! Attribute mapper.
//!
//! Turns raw directory records into POSIX identity records and builds the
//! partial-update documents that persist generated identifiers. Both storage
//! shapes of [`IdentityAttributeMode`] are handled here, so nothing above this
//! layer branches on the mode except to pick an API version.

use chrono::DateTime;
use serde_json::{Map, Value, json};

use crate::config::{GroupConfig, UserConfig};
use crate::domain::{
    CUSTOM_ATTRIBUTES, DISPLAY_NAME, DirectoryRecord, IdKind, IdentityAttributeMode,
    LAST_PASSWORD_CHANGE, MEMBERS, OBJECT_ID, PRINCIPAL_NAME, ResolvedGroup, ResolvedUser,
    ShadowRecord,
};
use crate::error::MappingError;

/// Seconds in a day, for epoch day counts.
const SECONDS_PER_DAY: i64 = 86_400;

/// Type tag declared on a custom attribute set value.
const CUSTOM_ATTRIBUTE_VALUE_TYPE: &str = "#microsoft.graph.customSecurityAttributeValue";

/// Type tag declared on an integer custom attribute.
const INT32_TYPE: &str = "#Int32";

/// Shadow aging defaults for directory accounts.
const SHADOW_MIN_CHANGE_DAYS: i64 = 0;
const SHADOW_MAX_CHANGE_DAYS: i64 = 99_999;
const SHADOW_WARN_DAYS: i64 = 7;
const SHADOW_EXPIRATION_DAY: i64 = 99_999;

/// Strip the domain suffix from a principal name.
///
/// `alice@example.com` becomes `alice`; a name without `@` is returned as-is.
#[must_use]
pub fn principal_to_username(principal: &str) -> &str {
    principal.split_once('@').map_or(principal, |(name, _)| name)
}

/// Interpret a JSON value as a numeric identifier.
///
/// Numbers and numeric strings are accepted; negative, fractional,
/// out-of-range and non-numeric values are rejected.
///
/// # Errors
///
/// Returns `MappingError::InvalidAttribute` if the value is not a `u32`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::float_cmp)]
pub fn parse_identifier(name: &str, value: &Value) -> Result<u32, MappingError> {
    let invalid = |reason: String| MappingError::InvalidAttribute {
        name: name.to_string(),
        reason,
    };

    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| {
                // 10001.0 is how some clients serialize integers
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && *f >= 0.0 && *f <= f64::from(u32::MAX))
                    .map(|f| f as u64)
            })
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| invalid(format!("{n} is not a valid identifier"))),
        Value::String(s) => s
            .trim()
            .parse::<u32>()
            .map_err(|e| invalid(format!("{s:?}: {e}"))),
        other => Err(invalid(format!("unexpected JSON type: {other}"))),
    }
}

/// Read an identifier stored on a record under the given mode.
///
/// Missing attributes, and missing intermediate levels in custom mode, yield
/// `Ok(None)`.
///
/// # Errors
///
/// Returns an error if the attribute is present but not a valid identifier.
pub fn extract_id(
    record: &DirectoryRecord,
    mode: &IdentityAttributeMode,
    kind: IdKind,
) -> Result<Option<u32>, MappingError> {
    let attribute = mode.attribute(kind);
    let value = match mode {
        IdentityAttributeMode::NativeAttribute { .. } => record.get(attribute),
        IdentityAttributeMode::CustomAttributeSet { attribute_set, .. } => record
            .object_attr(CUSTOM_ATTRIBUTES)
            .and_then(|sets| sets.get(attribute_set))
            .and_then(Value::as_object)
            .and_then(|set| set.get(attribute))
            .filter(|v| !v.is_null()),
    };

    value.map(|v| parse_identifier(attribute, v)).transpose()
}

/// Build the partial-update document persisting `value`.
#[must_use]
pub fn id_document(mode: &IdentityAttributeMode, kind: IdKind, value: u32) -> Value {
    let attribute = mode.attribute(kind);
    match mode {
        IdentityAttributeMode::NativeAttribute { .. } => json!({ attribute: value }),
        IdentityAttributeMode::CustomAttributeSet { attribute_set, .. } => {
            let mut set = Map::new();
            set.insert(
                "@odata.type".to_string(),
                Value::String(CUSTOM_ATTRIBUTE_VALUE_TYPE.to_string()),
            );
            set.insert(
                format!("{attribute}@odata.type"),
                Value::String(INT32_TYPE.to_string()),
            );
            set.insert(attribute.to_string(), Value::from(value));
            json!({ CUSTOM_ATTRIBUTES: { attribute_set: set } })
        }
    }
}

/// Flatten an expanded membership list into login names.
///
/// Members without a principal name (devices, nested groups, service
/// principals) are skipped; the order of the rest is preserved.
#[must_use]
pub fn flatten_members(record: &DirectoryRecord) -> Vec<String> {
    record
        .array_attr(MEMBERS)
        .map(|members| {
            members
                .iter()
                .filter_map(|m| m.get(PRINCIPAL_NAME).and_then(Value::as_str))
                .map(|upn| principal_to_username(upn).to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Days since the epoch of the last password change, if recorded.
#[must_use]
pub fn last_change_day(record: &DirectoryRecord) -> Option<i64> {
    let timestamp = record.str_attr(LAST_PASSWORD_CHANGE)?;
    let parsed = DateTime::parse_from_rfc3339(timestamp).ok()?;
    Some(parsed.timestamp().div_euclid(SECONDS_PER_DAY))
}

/// Maps records according to the configured user and group shapes.
#[derive(Debug, Clone)]
pub struct AttributeMapper {
    users: UserConfig,
    groups: GroupConfig,
}

impl AttributeMapper {
    /// Create a mapper for the given configuration.
    #[must_use]
    pub const fn new(users: UserConfig, groups: GroupConfig) -> Self {
        Self { users, groups }
    }

    /// User configuration.
    #[must_use]
    pub const fn users(&self) -> &UserConfig {
        &self.users
    }

    /// Group configuration.
    #[must_use]
    pub const fn groups(&self) -> &GroupConfig {
        &self.groups
    }

    /// Attributes to select on user queries.
    #[must_use]
    pub fn user_fields(&self) -> Vec<String> {
        let mut fields = vec![
            OBJECT_ID.to_string(),
            DISPLAY_NAME.to_string(),
            PRINCIPAL_NAME.to_string(),
        ];
        fields.extend(self.users.storage.select_fields());
        fields
    }

    /// Attributes to select on shadow queries.
    #[must_use]
    pub fn shadow_fields(&self) -> Vec<String> {
        vec![
            OBJECT_ID.to_string(),
            PRINCIPAL_NAME.to_string(),
            LAST_PASSWORD_CHANGE.to_string(),
        ]
    }

    /// Attributes to select on group queries.
    #[must_use]
    pub fn group_fields(&self) -> Vec<String> {
        let mut fields = vec![OBJECT_ID.to_string(), DISPLAY_NAME.to_string()];
        match &self.groups.storage {
            IdentityAttributeMode::NativeAttribute { gid_attribute, .. } => {
                fields.push(gid_attribute.clone());
            }
            IdentityAttributeMode::CustomAttributeSet { .. } => {
                fields.push(CUSTOM_ATTRIBUTES.to_string());
            }
        }
        fields
    }

    /// Stored UID of a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value is malformed.
    pub fn user_uid(&self, record: &DirectoryRecord) -> Result<Option<u32>, MappingError> {
        extract_id(record, &self.users.storage, IdKind::Uid)
    }

    /// Primary GID of a user, falling back to the configured default.
    #[must_use]
    pub fn user_gid(&self, record: &DirectoryRecord) -> u32 {
        extract_id(record, &self.users.storage, IdKind::Gid)
            .ok()
            .flatten()
            .unwrap_or(self.users.default_gid)
    }

    /// Stored GID of a group.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value is malformed.
    pub fn group_gid(&self, record: &DirectoryRecord) -> Result<Option<u32>, MappingError> {
        extract_id(record, &self.groups.storage, IdKind::Gid)
    }

    /// Login name of a user record.
    ///
    /// # Errors
    ///
    /// Returns an error if the principal name is absent.
    pub fn username(&self, record: &DirectoryRecord) -> Result<String, MappingError> {
        record
            .str_attr(PRINCIPAL_NAME)
            .map(|upn| principal_to_username(upn).to_string())
            .ok_or_else(|| MappingError::MissingAttribute(PRINCIPAL_NAME.to_string()))
    }

    /// Build a passwd entry for a user with an already resolved UID.
    ///
    /// # Errors
    ///
    /// Returns an error if the principal name is absent.
    pub fn to_user(&self, record: &DirectoryRecord, uid: u32) -> Result<ResolvedUser, MappingError> {
        let username = self.username(record)?;
        Ok(ResolvedUser {
            uid,
            gid: self.user_gid(record),
            display_name: record.str_attr(DISPLAY_NAME).unwrap_or_default().to_string(),
            home_directory: self.users.home_directory(&username),
            shell: self.users.shell.clone(),
            username,
        })
    }

    /// Build a group entry with an already resolved GID.
    ///
    /// # Errors
    ///
    /// Returns an error if the display name is absent.
    pub fn to_group(&self, record: &DirectoryRecord, gid: u32) -> Result<ResolvedGroup, MappingError> {
        let groupname = record
            .str_attr(DISPLAY_NAME)
            .ok_or_else(|| MappingError::MissingAttribute(DISPLAY_NAME.to_string()))?;
        Ok(ResolvedGroup {
            groupname: groupname.to_string(),
            gid,
            members: flatten_members(record),
        })
    }

    /// Build a shadow entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the principal name is absent.
    pub fn to_shadow(&self, record: &DirectoryRecord) -> Result<ShadowRecord, MappingError> {
        Ok(ShadowRecord {
            username: self.username(record)?,
            last_change_day: last_change_day(record),
            min_change_days: SHADOW_MIN_CHANGE_DAYS,
            max_change_days: SHADOW_MAX_CHANGE_DAYS,
            warn_days: SHADOW_WARN_DAYS,
            expiration_day: SHADOW_EXPIRATION_DAY,
        })
    }

    /// Document persisting a user's UID.
    #[must_use]
    pub fn uid_document(&self, uid: u32) -> Value {
        id_document(&self.users.storage, IdKind::Uid, uid)
    }

    /// Document persisting a group's GID.
    #[must_use]
    pub fn gid_document(&self, gid: u32) -> Value {
        id_document(&self.groups.storage, IdKind::Gid, gid)
    }
}
