//! Directory access module.
//!
//! Provides the abstraction over the remote directory service and its
//! REST implementation.

mod credential;
mod deadline;
mod factory;
mod http;
mod query;
mod traits;

#[cfg(test)]
pub(crate) mod scripted;

pub use credential::{StaticCredential, TokenCacheFile};
pub use deadline::DeadlineDirectory;
pub use factory::{create_credential, create_directory};
pub use http::HttpDirectory;
pub use query::DirectoryQuery;
pub use traits::{AccessToken, COLLECTION_VALUE, CredentialProvider, DirectoryClient, NEXT_LINK};
