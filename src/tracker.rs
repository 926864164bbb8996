//! Upgrade Tracker
//!
//! The tracker is the single persisted record of how far an instance has been
//! upgraded. It stores two keys in a shared key/value configuration file:
//!
//! - the version key (`SERVER_VERSION` by default): the version the instance
//!   is currently at
//! - the index key (`SERVER_UPGRADE_INDEX` by default): the last step applied
//!   from that version's upgrade directory, absent when none has been
//!
//! The tracker knows nothing about scriptlets. Every read goes back to disk
//! and every write replaces the file atomically.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, UpgradeError};
use crate::properties::KeyValueFile;
use crate::version::Version;

pub const DEFAULT_VERSION_KEY: &str = "SERVER_VERSION";
pub const DEFAULT_INDEX_KEY: &str = "SERVER_UPGRADE_INDEX";

/// Persistent upgrade position for one instance.
#[derive(Debug, Clone)]
pub struct Tracker {
    name: String,
    filename: PathBuf,
    version_key: String,
    index_key: String,
}

impl Tracker {
    /// Create a tracker using the default key names.
    pub fn new(name: impl Into<String>, filename: impl Into<PathBuf>) -> Self {
        Self::with_keys(name, filename, DEFAULT_VERSION_KEY, DEFAULT_INDEX_KEY)
    }

    pub fn with_keys(
        name: impl Into<String>,
        filename: impl Into<PathBuf>,
        version_key: impl Into<String>,
        index_key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            version_key: version_key.into(),
            index_key: index_key.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the configuration file holding the tracker keys.
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    fn load(&self) -> Result<KeyValueFile> {
        KeyValueFile::load(&self.filename).map_err(|e| {
            UpgradeError::tracker(format!(
                "failed to read {}: {e}",
                self.filename.display()
            ))
        })
    }

    fn store(&self, file: &KeyValueFile) -> Result<()> {
        file.store().map_err(|e| {
            UpgradeError::tracker(format!(
                "failed to write {}: {e}",
                self.filename.display()
            ))
        })
    }

    fn update(&self, edit: impl FnOnce(&mut KeyValueFile)) -> Result<()> {
        let mut file = self.load()?;
        edit(&mut file);
        self.store(&file)
    }

    /// Recorded version, or `None` if the tracker was never initialized.
    pub fn get_version(&self) -> Result<Option<Version>> {
        let file = self.load()?;
        match file.get(&self.version_key) {
            Some(raw) if !raw.is_empty() => Version::parse(raw).map(Some),
            _ => Ok(None),
        }
    }

    /// Recorded step index, or `None` if no step of the current version has
    /// been applied.
    pub fn get_index(&self) -> Result<Option<u32>> {
        let file = self.load()?;
        match file.get(&self.index_key) {
            Some(raw) if !raw.is_empty() => raw.parse::<u32>().map(Some).map_err(|_| {
                UpgradeError::tracker(format!(
                    "invalid {} value in {}: {raw}",
                    self.index_key,
                    self.filename.display()
                ))
            }),
            _ => Ok(None),
        }
    }

    pub fn set_version(&self, version: &Version) -> Result<()> {
        debug!("{}: setting version to {}", self.name, version);
        self.update(|file| file.set(&self.version_key, version.as_str()))
    }

    pub fn set_index(&self, index: u32) -> Result<()> {
        debug!("{}: setting index to {}", self.name, index);
        self.update(|file| file.set(&self.index_key, index.to_string()))
    }

    pub fn remove_index(&self) -> Result<()> {
        debug!("{}: removing index", self.name);
        self.update(|file| {
            file.remove(&self.index_key);
        })
    }

    /// Force the tracker to `version` with no step applied.
    pub fn set(&self, version: &Version) -> Result<()> {
        self.update(|file| {
            file.remove(&self.index_key);
            file.set(&self.version_key, version.as_str());
        })
    }

    /// Clear all tracker state. Other keys in the file are left alone.
    pub fn remove(&self) -> Result<()> {
        debug!("{}: removing tracker", self.name);
        self.update(|file| {
            file.remove(&self.index_key);
            file.remove(&self.version_key);
        })
    }

    /// Read-only snapshot of the tracker for display.
    pub fn show(&self) -> Result<TrackerReport> {
        Ok(TrackerReport {
            name: self.name.clone(),
            version: self.get_version()?,
            index: self.get_index()?,
        })
    }
}

/// Diagnostic dump produced by [`Tracker::show`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerReport {
    pub name: String,
    pub version: Option<Version>,
    pub index: Option<u32>,
}

impl fmt::Display for TrackerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        match &self.version {
            Some(version) => writeln!(f, "  Configuration version: {version}")?,
            None => writeln!(f, "  Configuration version: (not set)")?,
        }
        if let Some(index) = self.index {
            writeln!(f, "  Last completed scriptlet: {index}")?;
        }
        Ok(())
    }
}
