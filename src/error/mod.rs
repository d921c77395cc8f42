//! Error handling module.
//!
//! Every failure inside the resolver is a [`ResolveError`]. The facade never
//! lets one cross its boundary: [`ResolveError::status`] folds it into the
//! three-valued [`LookupStatus`] the host understands.

use crate::domain::{IdKind, LookupStatus};

/// Failure talking to the directory service.
///
/// `status` is the HTTP status code, or 0 for transport, decode and timeout
/// failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Directory request failed (status {status}): {message}")]
pub struct DirectoryError {
    /// HTTP status code, 0 when no response was received.
    pub status: u16,
    /// Whether repeating the request may succeed.
    pub retryable: bool,
    /// Human-readable detail.
    pub message: String,
}

impl DirectoryError {
    /// Error for a non-2xx HTTP response.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            retryable: status >= 500,
            message: message.into(),
        }
    }

    /// Error for a transport, decode or timeout failure.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: 0,
            retryable: true,
            message: message.into(),
        }
    }

    /// Whether the directory reported that the object does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

impl From<reqwest::Error> for DirectoryError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::http(status.as_u16(), err.to_string()),
            None => Self::transport(err.to_string()),
        }
    }
}

impl From<CredentialError> for DirectoryError {
    fn from(err: CredentialError) -> Self {
        Self {
            status: 401,
            retryable: false,
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for DirectoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::transport(format!("invalid response body: {err}"))
    }
}

/// A directory record did not have the expected attribute shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    /// A structurally required attribute is absent.
    #[error("Missing required attribute: {0}")]
    MissingAttribute(String),

    /// An attribute is present but cannot be interpreted.
    #[error("Invalid attribute {name}: {reason}")]
    InvalidAttribute {
        /// Attribute name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Failure obtaining a bearer token from the credential provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// No credential is configured.
    #[error("No credential configured")]
    NotConfigured,

    /// The cached token has expired.
    #[error("Cached token expired at {0}")]
    Expired(String),

    /// The token cache could not be read.
    #[error("Token cache unreadable: {0}")]
    Cache(String),
}

/// Failure in local account provisioning.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProvisioningError {
    /// The process table could not be read.
    #[error("Unable to read process list: {0}")]
    ProcessTable(String),

    /// The creation tool could not be started or exited unsuccessfully.
    #[error("Command failed: {command}: {detail}")]
    CommandFailed {
        /// Command line that was executed.
        command: String,
        /// Exit status or output.
        detail: String,
    },

    /// The local identity database could not be queried.
    #[error("Local identity lookup failed: {0}")]
    LocalLookup(String),

    /// The account still does not exist after running the creation tool.
    #[error("Account {0} missing after provisioning")]
    StillMissing(String),
}

/// Resolver-level error type.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Directory request failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// A record could not be mapped.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// No free identifier remains in the configured range.
    #[error("No free {kind} left in [{min}, {max}]")]
    AllocationExhausted {
        /// Kind of identifier requested.
        kind: IdKind,
        /// Range lower bound.
        min: u32,
        /// Range upper bound.
        max: u32,
    },

    /// The local account-creation tool is already running for this account.
    #[error("Provisioning already in progress: {command}")]
    ProvisioningConflict {
        /// Command line found in the process table.
        command: String,
    },

    /// Local provisioning failed.
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),
}

impl ResolveError {
    /// Map this error to the status reported to the host.
    #[must_use]
    pub const fn status(&self) -> LookupStatus {
        match self {
            Self::Directory(err) if err.is_not_found() => LookupStatus::NotFound,
            Self::Directory(_) | Self::AllocationExhausted { .. } => LookupStatus::Unavailable,
            Self::Mapping(_) | Self::ProvisioningConflict { .. } | Self::Provisioning(_) => {
                LookupStatus::NotFound
            }
        }
    }
}

/// Result type alias using `ResolveError`.
pub type Result<T> = std::result::Result<T, ResolveError>;

/// Result type alias using `DirectoryError`.
pub type DirectoryResult<T> = std::result::Result<T, DirectoryError>;
