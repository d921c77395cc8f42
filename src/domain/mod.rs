//! Domain models for identity resolution.
//!
//! This module contains the directory record wrapper, the attribute storage
//! shapes, allocation ranges, and the resolved POSIX records handed back to
//! the host.

pub mod identity;
pub mod range;
pub mod record;

pub use identity::{
    LOCKED_PASSWORD, Lookup, LookupStatus, ResolvedGroup, ResolvedUser, SHADOWED_PASSWORD,
    ShadowRecord,
};
pub use range::AllocationRange;
pub use record::{
    CUSTOM_ATTRIBUTES, DISPLAY_NAME, DirectoryRecord, IdKind, IdentityAttributeMode,
    LAST_PASSWORD_CHANGE, MEMBERS, OBJECT_ID, PRINCIPAL_NAME,
};
