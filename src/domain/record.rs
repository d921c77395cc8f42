//! Directory records and identity attribute storage shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Attribute holding the principal name of a user object.
pub const PRINCIPAL_NAME: &str = "userPrincipalName";

/// Attribute holding the directory object id.
pub const OBJECT_ID: &str = "id";

/// Attribute holding the display name of a user or group.
pub const DISPLAY_NAME: &str = "displayName";

/// Attribute holding the timestamp of the last password change.
pub const LAST_PASSWORD_CHANGE: &str = "lastPasswordChangeDateTime";

/// Collection holding custom attribute sets.
pub const CUSTOM_ATTRIBUTES: &str = "customSecurityAttributes";

/// Expanded membership collection of a group.
pub const MEMBERS: &str = "members";

/// One user or group object as returned by the directory service.
///
/// This is an opaque attribute map; typed access happens in the mapper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DirectoryRecord(Map<String, Value>);

impl DirectoryRecord {
    /// Build a record from a JSON value, returning `None` for non-objects.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Raw attribute lookup. JSON `null` is reported as absent.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    /// String attribute lookup.
    #[must_use]
    pub fn str_attr(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Nested object lookup.
    #[must_use]
    pub fn object_attr(&self, name: &str) -> Option<&Map<String, Value>> {
        self.get(name).and_then(Value::as_object)
    }

    /// Array attribute lookup.
    #[must_use]
    pub fn array_attr(&self, name: &str) -> Option<&Vec<Value>> {
        self.get(name).and_then(Value::as_array)
    }

    /// The directory object id, if present.
    #[must_use]
    pub fn object_id(&self) -> Option<&str> {
        self.str_attr(OBJECT_ID)
    }
}

/// Kind of identifier being resolved or allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    /// User identifier.
    Uid,
    /// Group identifier.
    Gid,
}

impl IdKind {
    /// Metric label for this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uid => "uid",
            Self::Gid => "gid",
        }
    }
}

impl std::fmt::Display for IdKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where UID/GID values live on a directory object.
///
/// Selected once from configuration; the mapper and the allocator both
/// branch on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IdentityAttributeMode {
    /// Identifiers are top-level attributes on the generally-available API.
    NativeAttribute {
        /// Attribute holding the UID.
        #[serde(default = "default_uid_attribute")]
        uid_attribute: String,
        /// Attribute holding the GID.
        #[serde(default = "default_gid_attribute")]
        gid_attribute: String,
    },
    /// Identifiers live inside a named custom attribute set on the
    /// expanded API.
    CustomAttributeSet {
        /// Name of the attribute set.
        attribute_set: String,
        /// Attribute holding the UID within the set.
        #[serde(default = "default_uid_attribute")]
        uid_attribute: String,
        /// Attribute holding the GID within the set.
        #[serde(default = "default_gid_attribute")]
        gid_attribute: String,
    },
}

fn default_uid_attribute() -> String {
    "uidNumber".to_string()
}

fn default_gid_attribute() -> String {
    "gidNumber".to_string()
}

impl IdentityAttributeMode {
    /// Native mode with the given attribute names.
    #[must_use]
    pub fn native(uid_attribute: impl Into<String>, gid_attribute: impl Into<String>) -> Self {
        Self::NativeAttribute {
            uid_attribute: uid_attribute.into(),
            gid_attribute: gid_attribute.into(),
        }
    }

    /// Custom attribute set mode with the given names.
    #[must_use]
    pub fn custom(
        attribute_set: impl Into<String>,
        uid_attribute: impl Into<String>,
        gid_attribute: impl Into<String>,
    ) -> Self {
        Self::CustomAttributeSet {
            attribute_set: attribute_set.into(),
            uid_attribute: uid_attribute.into(),
            gid_attribute: gid_attribute.into(),
        }
    }

    /// API version segment serving this storage shape.
    #[must_use]
    pub const fn api_version(&self) -> &'static str {
        match self {
            Self::NativeAttribute { .. } => "v1.0",
            Self::CustomAttributeSet { .. } => "beta",
        }
    }

    /// Name of the attribute storing the given identifier kind.
    #[must_use]
    pub fn attribute(&self, kind: IdKind) -> &str {
        match (self, kind) {
            (
                Self::NativeAttribute { uid_attribute, .. }
                | Self::CustomAttributeSet { uid_attribute, .. },
                IdKind::Uid,
            ) => uid_attribute,
            (
                Self::NativeAttribute { gid_attribute, .. }
                | Self::CustomAttributeSet { gid_attribute, .. },
                IdKind::Gid,
            ) => gid_attribute,
        }
    }

    /// Fields to `$select` so that both identifiers are returned.
    #[must_use]
    pub fn select_fields(&self) -> Vec<String> {
        match self {
            Self::NativeAttribute {
                uid_attribute,
                gid_attribute,
            } => vec![uid_attribute.clone(), gid_attribute.clone()],
            Self::CustomAttributeSet { .. } => vec![CUSTOM_ATTRIBUTES.to_string()],
        }
    }

    /// Filter path addressing the identifier attribute in a query.
    #[must_use]
    pub fn filter_path(&self, kind: IdKind) -> String {
        match self {
            Self::NativeAttribute { .. } => self.attribute(kind).to_string(),
            Self::CustomAttributeSet { attribute_set, .. } => format!(
                "{CUSTOM_ATTRIBUTES}/{attribute_set}/{}",
                self.attribute(kind)
            ),
        }
    }
}

impl Default for IdentityAttributeMode {
    fn default() -> Self {
        Self::NativeAttribute {
            uid_attribute: default_uid_attribute(),
            gid_attribute: default_gid_attribute(),
        }
    }
}
