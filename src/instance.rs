//! Server instances and their subsystems.
//!
//! The upgrader treats instances as opaque handles: it needs a name for
//! messages, a configuration directory for the tracker, and an ordered list
//! of subsystems it can reload before each step. [`ServerInstance`] is the
//! filesystem-backed implementation used by the CLI.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{Result, UpgradeError};
use crate::properties::KeyValueFile;

/// Name of the per-subsystem configuration file under `<subsystem>/conf/`.
pub const SUBSYSTEM_CONFIG: &str = "CS.cfg";

/// A component of an instance that scriptlets can upgrade individually.
pub trait Subsystem {
    fn name(&self) -> &str;

    /// Re-read on-disk state, discarding the in-memory view.
    fn load(&mut self) -> Result<()>;

    fn config(&self) -> &KeyValueFile;

    fn config_mut(&mut self) -> &mut KeyValueFile;

    /// Persist the in-memory configuration.
    fn save(&mut self) -> Result<()>;
}

/// The thing being upgraded.
pub trait Instance {
    fn name(&self) -> &str;

    /// Directory holding the instance-wide configuration files.
    fn conf_dir(&self) -> &Path;

    /// Subsystems in the order they must be upgraded.
    fn subsystems_mut(&mut self) -> &mut [Box<dyn Subsystem>];

    /// Identity handed to per-subsystem hooks while a subsystem is borrowed.
    fn info(&self) -> InstanceInfo {
        InstanceInfo {
            name: self.name().to_string(),
            conf_dir: self.conf_dir().to_path_buf(),
        }
    }
}

/// Detached copy of an instance's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub name: String,
    pub conf_dir: PathBuf,
}

impl fmt::Display for InstanceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Subsystem backed by `<instance>/<name>/conf/CS.cfg`.
#[derive(Debug, Clone)]
pub struct ServerSubsystem {
    name: String,
    config: KeyValueFile,
}

impl ServerSubsystem {
    pub fn open(name: impl Into<String>, config_path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            config: KeyValueFile::load(config_path)?,
        })
    }
}

impl Subsystem for ServerSubsystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&mut self) -> Result<()> {
        self.config = KeyValueFile::load(self.config.path().to_path_buf())?;
        Ok(())
    }

    fn config(&self) -> &KeyValueFile {
        &self.config
    }

    fn config_mut(&mut self) -> &mut KeyValueFile {
        &mut self.config
    }

    fn save(&mut self) -> Result<()> {
        self.config.store()
    }
}

/// Instance laid out on disk as:
///
/// ```text
/// <base>/conf/            instance configuration (tracker lives here)
/// <base>/<subsystem>/conf/CS.cfg
/// ```
pub struct ServerInstance {
    name: String,
    conf_dir: PathBuf,
    subsystems: Vec<Box<dyn Subsystem>>,
}

impl ServerInstance {
    /// Open the instance at `base_dir` and enumerate its subsystems by name.
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        if !base_dir.is_dir() {
            return Err(UpgradeError::config(format!(
                "instance directory not found: {}",
                base_dir.display()
            )));
        }

        let name = base_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                UpgradeError::config(format!("invalid instance path: {}", base_dir.display()))
            })?;

        let mut names = Vec::new();
        for entry in fs::read_dir(&base_dir)? {
            let entry = entry?;
            let config = entry.path().join("conf").join(SUBSYSTEM_CONFIG);
            if entry.file_type()?.is_dir() && config.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();

        let mut subsystems: Vec<Box<dyn Subsystem>> = Vec::with_capacity(names.len());
        for sub in names {
            let config = base_dir.join(&sub).join("conf").join(SUBSYSTEM_CONFIG);
            debug!("Found {} subsystem in {} instance", sub, name);
            subsystems.push(Box::new(ServerSubsystem::open(sub, config)?));
        }

        Ok(Self {
            name,
            conf_dir: base_dir.join("conf"),
            subsystems,
        })
    }

    pub fn subsystem_names(&self) -> Vec<&str> {
        self.subsystems.iter().map(|s| s.name()).collect()
    }
}

impl Instance for ServerInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn conf_dir(&self) -> &Path {
        &self.conf_dir
    }

    fn subsystems_mut(&mut self) -> &mut [Box<dyn Subsystem>] {
        &mut self.subsystems
    }
}

impl fmt::Display for ServerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
