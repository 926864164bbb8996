//! Upgrade configuration file.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration. Command-line flags are applied on top of the loaded file.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::tracker::{DEFAULT_INDEX_KEY, DEFAULT_VERSION_KEY};
use crate::upgrader::{UpgradeSettings, DEFAULT_TRACKER_FILE};
use crate::version::Version;

pub const DEFAULT_UPGRADE_DIR: &str = "/usr/share/srvupgrade/server/upgrade";
pub const DEFAULT_BACKUP_DIR: &str = "/var/log/srvupgrade/server/upgrade";
pub const DEFAULT_LOG_DIR: &str = "/var/log/srvupgrade";

/// Upgrade configuration that can be saved/loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpgradeConfig {
    /// Root of the version/scriptlet tree
    pub upgrade_dir: PathBuf,
    /// Root of the per-step backup tree
    pub backup_dir: PathBuf,
    /// Where upgrade logs are written
    pub log_dir: PathBuf,
    /// Version to upgrade to (defaults to this tool's version)
    pub target_version: String,
    /// Tracker file name relative to the instance conf directory
    pub tracker_file: String,
    pub version_key: String,
    pub index_key: String,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            upgrade_dir: PathBuf::from(DEFAULT_UPGRADE_DIR),
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            target_version: env!("CARGO_PKG_VERSION").to_string(),
            tracker_file: DEFAULT_TRACKER_FILE.to_string(),
            version_key: DEFAULT_VERSION_KEY.to_string(),
            index_key: DEFAULT_INDEX_KEY.to_string(),
        }
    }
}

impl UpgradeConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;

        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        for (name, dir) in [
            ("upgrade_dir", &self.upgrade_dir),
            ("backup_dir", &self.backup_dir),
            ("log_dir", &self.log_dir),
        ] {
            if dir.as_os_str().is_empty() {
                anyhow::bail!("{name} must be specified");
            }
        }

        self.target()?;

        let tracker = Path::new(&self.tracker_file);
        if self.tracker_file.trim().is_empty() || tracker.components().count() != 1 {
            anyhow::bail!("tracker_file must be a plain file name");
        }

        for (name, key) in [("version_key", &self.version_key), ("index_key", &self.index_key)] {
            if key.trim().is_empty() || key.contains('=') {
                anyhow::bail!("{name} must be a non-empty key without '='");
            }
        }
        if self.version_key == self.index_key {
            anyhow::bail!("version_key and index_key must differ");
        }

        Ok(())
    }

    /// Parsed target version
    pub fn target(&self) -> Result<Version> {
        Version::parse(&self.target_version)
            .with_context(|| format!("Invalid target_version {:?}", self.target_version))
    }

    pub fn settings(&self) -> UpgradeSettings {
        UpgradeSettings {
            upgrade_dir: self.upgrade_dir.clone(),
            backup_dir: self.backup_dir.clone(),
            log_dir: self.log_dir.clone(),
            tracker_file: self.tracker_file.clone(),
            version_key: self.version_key.clone(),
            index_key: self.index_key.clone(),
        }
    }
}
