//! Scriptlet contract.
//!
//! A scriptlet is one discrete upgrade step. The upgrader drives it through
//! three hooks, in this order:
//!
//! 1. [`Scriptlet::upgrade_subsystem`] once per subsystem, after the
//!    subsystem has been reloaded from disk
//! 2. [`Scriptlet::upgrade_instance`] once for the instance
//! 3. [`Scriptlet::backup`] as the first half of the tracker commit
//!
//! Both effect hooks default to no-ops so a scriptlet only implements the
//! level it cares about. They receive the step's [`Backup`]; a scriptlet
//! saves each file there before changing or creating it.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Component, Path, PathBuf};

use anyhow::Context;

use crate::instance::{Instance, InstanceInfo, Subsystem};
use crate::version::{Position, Version};

/// File inside a backup directory listing files that did not exist when the
/// backup was taken.
pub const NEW_FILES_LIST: &str = "newfiles";

pub trait Scriptlet {
    /// One-line description shown while the step runs.
    fn message(&self) -> &str;

    fn upgrade_subsystem(
        &mut self,
        _instance: &InstanceInfo,
        _subsystem: &mut dyn Subsystem,
        _backup: &Backup,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn upgrade_instance(
        &mut self,
        _instance: &mut dyn Instance,
        _backup: &Backup,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Snapshot the tracker file before the commit moves it.
    fn backup(&mut self, backup: &Backup, tracker_file: &Path) -> anyhow::Result<()> {
        backup.save(tracker_file)
    }
}

/// Backup directory for one step: `{backup_root}/{version}/{index}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backup {
    dir: PathBuf,
}

impl Backup {
    pub fn new(backup_root: &Path, position: &Position) -> Self {
        Self {
            dir: backup_root
                .join(position.version.as_str())
                .join(position.index.to_string()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where `path` is copied to inside the backup directory. Absolute paths
    /// are re-rooted under the backup directory.
    pub fn target_for(&self, path: &Path) -> PathBuf {
        let relative: PathBuf = path
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        self.dir.join(relative)
    }

    /// True if `path` was already copied or listed as new.
    pub fn contains(&self, path: &Path) -> bool {
        if self.target_for(path).exists() {
            return true;
        }
        let listed = fs::read_to_string(self.dir.join(NEW_FILES_LIST)).unwrap_or_default();
        let wanted = path.display().to_string();
        listed.lines().any(|line| line == wanted)
    }

    /// Copy `path` into the backup directory. A file that does not exist yet
    /// is listed in [`NEW_FILES_LIST`] instead.
    ///
    /// The first save of a path wins, so a step that is re-run after a
    /// partial failure keeps the content from before its first attempt.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if self.contains(path) {
            return Ok(());
        }
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        if !path.exists() {
            let list = self.dir.join(NEW_FILES_LIST);
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&list)
                .with_context(|| format!("failed to open {}", list.display()))?;
            writeln!(file, "{}", path.display())
                .with_context(|| format!("failed to append to {}", list.display()))?;
            return Ok(());
        }

        let target = self.target_for(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::copy(path, &target).with_context(|| {
            format!(
                "failed to back up {} to {}",
                path.display(),
                target.display()
            )
        })?;
        Ok(())
    }
}

/// A scriptlet bound to its place in the upgrade sequence.
pub struct Step {
    pub position: Position,
    pub name: String,
    /// True for the highest index within its version.
    pub last: bool,
    /// Version the tracker moves to once the last step of this version
    /// commits.
    pub next: Version,
    pub scriptlet: Box<dyn Scriptlet>,
}

impl Step {
    pub fn version(&self) -> &Version {
        &self.position.version
    }

    pub fn index(&self) -> u32 {
        self.position.index
    }

    pub fn successor(&self) -> &Version {
        &self.next
    }

    pub fn message(&self) -> &str {
        self.scriptlet.message()
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("position", &self.position)
            .field("name", &self.name)
            .field("last", &self.last)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}
