//! # CloudID NSS
//!
//! POSIX identity resolution backed by a cloud directory service:
//!
//! - **passwd / group / shadow lookups**: directory users and security groups
//!   rendered as POSIX records, by name, by numeric id, or enumerated
//! - **Identifier allocation**: users and groups without a UID/GID get a free
//!   one from a configured range, written back to the directory
//! - **Local provisioning**: optional on-demand `useradd` / `groupadd` with a
//!   re-entry guard
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          IdentityResolver                            │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐  │
//! │  │  Attribute  │  │ Identifier  │  │ Provisioner │  │  Directory  │  │
//! │  │  Mapper     │  │ Allocator   │→ │ (optional)  │  │  Client     │  │
//! │  └─────────────┘  └─────────────┘  └─────────────┘  └─────────────┘  │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

pub mod config;
pub mod directory;
pub mod domain;
pub mod error;
pub mod service;

use std::sync::Arc;

use tracing::debug;

use crate::config::{AppConfig, ObservabilityConfig};
use crate::directory::create_directory;
use crate::error::DirectoryResult;
use crate::service::privilege::invoking_uid;
use crate::service::{CallerPrivilege, IdentityResolver, Provisioner, telemetry};

/// Build a resolver for the current process.
///
/// Detects the caller's privilege, selects its credential, and enables local
/// provisioning when configured.
///
/// # Errors
///
/// Returns an error if the directory client cannot be initialized.
pub fn build_resolver(config: AppConfig) -> DirectoryResult<IdentityResolver> {
    let uid = invoking_uid();
    let privilege = CallerPrivilege::detect();
    debug!(uid, ?privilege, "Detected caller");

    telemetry::describe_metrics();

    let directory = create_directory(&config.directory, uid)?;
    let provisioning = config.provisioning.clone();
    let resolver = IdentityResolver::new(Arc::new(config), directory, privilege);

    if provisioning.enabled() {
        Ok(resolver.with_provisioner(Provisioner::system(provisioning)))
    } else {
        Ok(resolver)
    }
}

/// Initialize logging based on configuration.
///
/// Logs go to stderr; `RUST_LOG` overrides the configured level.
pub fn init_logging(config: &ObservabilityConfig) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.log_format == "json" {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
