//! Local account provisioning configuration.

use std::path::PathBuf;

use serde::Deserialize;

/// Local account provisioning configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisioningConfig {
    /// Create a local user account on a by-name lookup.
    #[serde(default)]
    pub create_user: bool,

    /// Create a local group on a by-name lookup.
    #[serde(default)]
    pub create_group: bool,

    /// User creation executable.
    #[serde(default = "default_useradd_path")]
    pub useradd_path: PathBuf,

    /// Arguments placed before the account name.
    #[serde(default = "default_useradd_args")]
    pub useradd_args: Vec<String>,

    /// Group creation executable.
    #[serde(default = "default_groupadd_path")]
    pub groupadd_path: PathBuf,

    /// Arguments placed before the group name.
    #[serde(default)]
    pub groupadd_args: Vec<String>,

    /// Mount point of the process filesystem.
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,
}

fn default_useradd_path() -> PathBuf {
    PathBuf::from("/usr/sbin/useradd")
}

fn default_useradd_args() -> Vec<String> {
    ["-m", "-s", "/bin/bash", "-c", "cloudid-nss"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_groupadd_path() -> PathBuf {
    PathBuf::from("/usr/sbin/groupadd")
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

impl ProvisioningConfig {
    /// Whether any local provisioning is enabled.
    #[must_use]
    pub const fn enabled(&self) -> bool {
        self.create_user || self.create_group
    }
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            create_user: false,
            create_group: false,
            useradd_path: default_useradd_path(),
            useradd_args: default_useradd_args(),
            groupadd_path: default_groupadd_path(),
            groupadd_args: Vec::new(),
            proc_root: default_proc_root(),
        }
    }
}
