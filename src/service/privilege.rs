//! Caller privilege detection.

use rustix::process::{geteuid, getuid};

/// Privilege of the process asking for a lookup.
///
/// Only an elevated caller may write identifiers back to the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerPrivilege {
    /// Running as root.
    Elevated,
    /// Any other user.
    Unprivileged,
}

impl CallerPrivilege {
    /// Classify a numeric user id.
    #[must_use]
    pub const fn from_uid(uid: u32) -> Self {
        if uid == 0 {
            Self::Elevated
        } else {
            Self::Unprivileged
        }
    }

    /// Privilege of the current process, from its effective uid.
    #[must_use]
    pub fn detect() -> Self {
        Self::from_uid(geteuid().as_raw())
    }

    /// Whether identifier writes are allowed.
    #[must_use]
    pub const fn is_elevated(self) -> bool {
        matches!(self, Self::Elevated)
    }
}

/// Real uid of the user who started the process.
///
/// Owns the delegated token cache, which stays with the invoking user even
/// when the process runs setuid.
#[must_use]
pub fn invoking_uid() -> u32 {
    getuid().as_raw()
}
