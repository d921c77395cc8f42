//! Configuration management module.
//!
//! Supports loading configuration from:
//! - a `.env` file in the working directory
//! - TOML files (`/etc/cloudid-nss/default.toml`, `config/default.toml`,
//!   `config/{profile}.toml`)
//! - Environment variables with `CLOUDID_NSS__<SECTION>__<KEY>` pattern
//!
//! Configuration is loaded once and shared read-only for the lifetime of the
//! process.

mod directory;
mod identity;
mod provisioning;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use directory::DirectoryConfig;
pub use identity::{
    GroupConfig, ResolverConfig, TEMPLATE_PLACEHOLDER, UnprivilegedAccess, UserConfig,
};
pub use provisioning::ProvisioningConfig;

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// Directory service connection.
    #[serde(default)]
    pub directory: DirectoryConfig,

    /// User resolution.
    #[serde(default)]
    pub users: UserConfig,

    /// Group resolution.
    #[serde(default)]
    pub groups: GroupConfig,

    /// Resolver policy.
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Local account provisioning.
    #[serde(default)]
    pub provisioning: ProvisioningConfig,

    /// Observability configuration.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from files and environment.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. `/etc/cloudid-nss/default.toml`
    /// 2. `config/default.toml`
    /// 3. `config/{CLOUDID_PROFILE}.toml` (if `CLOUDID_PROFILE` is set)
    /// 4. Environment variables with `CLOUDID_NSS__` prefix (a `.env` file is
    ///    read first)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration cannot be loaded or is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env file is normal
        let _ = dotenvy::dotenv();

        let profile =
            std::env::var("CLOUDID_PROFILE").unwrap_or_else(|_| "production".to_string());

        let config = Config::builder()
            .add_source(File::with_name("/etc/cloudid-nss/default").required(false))
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{profile}")).required(false))
            // CLOUDID_NSS__USERS__AUTO_ALLOCATE=true -> users.auto_allocate = true
            .add_source(
                Environment::with_prefix("CLOUDID_NSS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: Self = config.try_deserialize()?;
        app_config.validate()?;

        Ok(app_config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.directory.validate()?;
        self.users.validate()?;
        self.groups.validate()?;
        self.resolver.validate()?;

        if let Some(sentinel) = self.resolver.sentinel_uid
            && self.users.uid_range.contains(sentinel)
        {
            return Err(ConfigError::Message(format!(
                "resolver.sentinel_uid {sentinel} lies inside users.uid_range {}",
                self.users.uid_range
            )));
        }

        Ok(())
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format: "text" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}
