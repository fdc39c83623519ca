//! Runtime configuration.
//!
//! Non-secret settings come from an optional TOML file, secrets only from the
//! environment. Command line flags override file values.

use crate::allow_list::AllowList;
use crate::error::{SyncError, SyncResult};
use crate::sync::applicator::{DEFAULT_CLUSTER_ORPHAN_COMMENT, DEFAULT_VM_ORPHAN_COMMENT};
use crate::sync::{ChangeDetection, SyncSettings};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const ENV_VCENTER_HOSTNAME: &str = "VCENTER_HOSTNAME";
pub const ENV_VCENTER_USERNAME: &str = "VCENTER_USERNAME";
pub const ENV_VCENTER_PASSWORD: &str = "VCENTER_PASSWORD";
pub const ENV_NETBOX_API_URI: &str = "NETBOX_API_URI";
pub const ENV_NETBOX_API_TOKEN: &str = "NETBOX_API_TOKEN";

const REQUIRED_ENV: [&str; 5] = [
    ENV_VCENTER_HOSTNAME,
    ENV_VCENTER_USERNAME,
    ENV_VCENTER_PASSWORD,
    ENV_NETBOX_API_URI,
    ENV_NETBOX_API_TOKEN,
];

/// NetBox side settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetboxConfig {
    /// Cluster type name the synced clusters belong to
    pub cluster_type: String,
    /// Custom field holding the vCenter persistent id on clusters and VMs
    pub persistent_id_field: String,
    /// Boolean VM custom field that enables interface reconciliation
    pub interface_sync_field: String,
    pub page_size: usize,
    pub verify_tls: bool,
}

impl Default for NetboxConfig {
    fn default() -> Self {
        Self {
            cluster_type: "vSphere".to_string(),
            persistent_id_field: "vcenter_persistent_id".to_string(),
            interface_sync_field: "vcenter_sync_interfaces".to_string(),
            page_size: 500,
            verify_tls: false,
        }
    }
}

/// vCenter side settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VcenterConfig {
    pub verify_tls: bool,
}

/// Reconciliation behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub change_detection: ChangeDetection,
    pub dry_run: bool,
    pub cluster_orphan_comment: String,
    pub vm_orphan_comment: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            change_detection: ChangeDetection::default(),
            dry_run: false,
            cluster_orphan_comment: DEFAULT_CLUSTER_ORPHAN_COMMENT.to_string(),
            vm_orphan_comment: DEFAULT_VM_ORPHAN_COMMENT.to_string(),
        }
    }
}

/// Complete file configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub netbox: NetboxConfig,
    pub vcenter: VcenterConfig,
    pub sync: SyncConfig,
    /// NetBox custom field name to vCenter attribute name
    pub custom_fields: BTreeMap<String, String>,
}

/// Command line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub dry_run: bool,
    pub legacy_change_detection: bool,
}

impl AppConfig {
    /// `<config_dir>/vmware-netbox-sync/config.toml` for the current platform
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "vmware-netbox-sync")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> SyncResult<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => {
                    debug!("No config file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path).map_err(|e| {
            SyncError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> SyncResult<Self> {
        let config: AppConfig = toml::from_str(content)
            .map_err(|e| SyncError::Config(format!("Invalid config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.netbox.page_size == 0 {
            return Err(SyncError::Config(
                "netbox.page_size must be greater than zero".to_string(),
            ));
        }
        for (key, value) in [
            ("netbox.cluster_type", &self.netbox.cluster_type),
            ("netbox.persistent_id_field", &self.netbox.persistent_id_field),
            ("netbox.interface_sync_field", &self.netbox.interface_sync_field),
        ] {
            if value.trim().is_empty() {
                return Err(SyncError::Config(format!("{} must not be empty", key)));
            }
        }
        if let Some((field, _)) = self
            .custom_fields
            .iter()
            .find(|(field, attribute)| field.trim().is_empty() || attribute.trim().is_empty())
        {
            return Err(SyncError::Config(format!(
                "custom_fields entry '{}' has an empty name",
                field
            )));
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if overrides.dry_run {
            self.sync.dry_run = true;
        }
        if overrides.legacy_change_detection {
            self.sync.change_detection = ChangeDetection::Legacy;
        }
    }

    pub fn allow_list(&self) -> AllowList {
        AllowList::new(&self.custom_fields)
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            allow_list: self.allow_list(),
            change_detection: self.sync.change_detection,
            dry_run: self.sync.dry_run,
            cluster_orphan_comment: self.sync.cluster_orphan_comment.clone(),
            vm_orphan_comment: self.sync.vm_orphan_comment.clone(),
        }
    }
}

/// Connection secrets for both inventories
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub vcenter_hostname: String,
    pub vcenter_username: String,
    pub vcenter_password: String,
    pub netbox_api_uri: String,
    pub netbox_api_token: String,
}

impl Credentials {
    pub fn from_env() -> SyncResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup. Blank values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> SyncResult<Self> {
        let mut values = BTreeMap::new();
        let mut missing = Vec::new();
        for name in REQUIRED_ENV {
            match lookup(name).filter(|v| !v.trim().is_empty()) {
                Some(value) => {
                    values.insert(name, value);
                }
                None => missing.push(name.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(SyncError::MissingEnv(missing));
        }

        let mut take = |name: &str| values.remove(name).unwrap_or_default();
        Ok(Self {
            vcenter_hostname: take(ENV_VCENTER_HOSTNAME),
            vcenter_username: take(ENV_VCENTER_USERNAME),
            vcenter_password: take(ENV_VCENTER_PASSWORD),
            netbox_api_uri: take(ENV_NETBOX_API_URI),
            netbox_api_token: take(ENV_NETBOX_API_TOKEN),
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("vcenter_hostname", &self.vcenter_hostname)
            .field("vcenter_username", &self.vcenter_username)
            .field("vcenter_password", &"[REDACTED]")
            .field("netbox_api_uri", &self.netbox_api_uri)
            .field("netbox_api_token", &"[REDACTED]")
            .finish()
    }
}
