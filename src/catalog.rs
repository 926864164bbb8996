//! Scriptlet catalog.
//!
//! The catalog is the ordered set of every known upgrade step plus the
//! target version. Upgrade directories are named after the version they
//! upgrade *from*: the steps in `1.0/` move an instance from 1.0 to the next
//! known version (or to the target, if there is none). The target's own
//! directory runs last and leaves the instance at the target.
//!
//! ```text
//! {upgrade_dir}/
//!     1.0/
//!         01-RenameAuditLog.json
//!         02-AddCipherList.json
//!     1.1/
//!         01-UpdateJavaOpts.json
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::debug;

use crate::error::{Result, UpgradeError};
use crate::scriptlet::{Scriptlet, Step};
use crate::scriptlets::{ConfigEditDefinition, ConfigEditScriptlet};
use crate::version::{Position, Version};

/// Builds a fresh scriptlet for each run.
pub type ScriptletFactory = Box<dyn Fn() -> Box<dyn Scriptlet>>;

struct Entry {
    name: String,
    factory: ScriptletFactory,
}

/// One hop of the upgrade path: steps in `version` lead to `next`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionHop {
    pub version: Version,
    pub next: Version,
}

pub struct Catalog {
    target: Version,
    entries: BTreeMap<Position, Entry>,
}

impl Catalog {
    pub fn new(target: Version) -> Self {
        Self {
            target,
            entries: BTreeMap::new(),
        }
    }

    /// Register a step.
    ///
    /// # Errors
    ///
    /// Returns a `Catalog` error if the position is already taken.
    pub fn add(
        &mut self,
        version: Version,
        index: u32,
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn Scriptlet> + 'static,
    ) -> Result<()> {
        let position = Position::new(version, index);
        if let Some(existing) = self.entries.get(&position) {
            return Err(UpgradeError::catalog(format!(
                "duplicate scriptlet at {position}: {} already registered",
                existing.name
            )));
        }
        self.entries.insert(
            position,
            Entry {
                name: name.into(),
                factory: Box::new(factory),
            },
        );
        Ok(())
    }

    /// Discover `NN-Name.json` scriptlets under `upgrade_dir`.
    ///
    /// A missing upgrade directory yields an empty catalog. Directories that
    /// are not versions and files that do not match the naming pattern are
    /// skipped.
    pub fn from_dir(upgrade_dir: &Path, target: Version) -> Result<Self> {
        let mut catalog = Self::new(target);
        if !upgrade_dir.is_dir() {
            debug!("Upgrade directory {} not found", upgrade_dir.display());
            return Ok(catalog);
        }

        for entry in fs::read_dir(upgrade_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir_name = entry.file_name().to_string_lossy().into_owned();
            let Ok(version) = Version::parse(&dir_name) else {
                debug!("Skipping non-version directory {}", dir_name);
                continue;
            };

            for file in fs::read_dir(entry.path())? {
                let file = file?;
                let file_name = file.file_name().to_string_lossy().into_owned();
                let Some((index, name)) = parse_scriptlet_filename(&file_name) else {
                    debug!("Skipping {}/{}", dir_name, file_name);
                    continue;
                };

                let definition = ConfigEditDefinition::load_from_file(&file.path())?;
                debug!("Found scriptlet {}/{:02}-{}", version, index, name);
                catalog.add(version.clone(), index, name, move || {
                    Box::new(ConfigEditScriptlet::new(definition.clone())) as Box<dyn Scriptlet>
                })?;
            }
        }

        Ok(catalog)
    }

    pub fn target(&self) -> &Version {
        &self.target
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every version that has at least one step, ascending.
    pub fn all_versions(&self) -> Vec<Version> {
        let mut versions: Vec<Version> = Vec::new();
        for position in self.entries.keys() {
            if versions.last() != Some(&position.version) {
                versions.push(position.version.clone());
            }
        }
        versions
    }

    /// Version reached after the last step of `version` commits: the next
    /// catalog version up to the target, or the target itself.
    pub fn successor(&self, version: &Version) -> Version {
        self.all_versions()
            .into_iter()
            .find(|v| v > version && *v <= self.target)
            .unwrap_or_else(|| self.target.clone())
    }

    /// Versions on the upgrade path: `current` first, then every catalog
    /// version above it up to and including the target.
    pub fn versions(&self, current: &Version) -> Vec<Version> {
        if *current > self.target {
            return Vec::new();
        }

        let mut versions = vec![current.clone()];
        versions.extend(
            self.all_versions()
                .into_iter()
                .filter(|v| v > current && *v <= self.target),
        );
        versions
    }

    /// Upgrade path from `current` to the target. The first hop always
    /// starts at `current`, whether or not it has steps; the target's own
    /// hop leads back to the target.
    pub fn path(&self, current: &Version) -> Vec<VersionHop> {
        self.versions(current)
            .into_iter()
            .map(|version| VersionHop {
                next: self.successor(&version),
                version,
            })
            .collect()
    }

    /// Fresh steps of `hop.version` with an index above `after`.
    pub fn steps(&self, hop: &VersionHop, after: Option<u32>) -> Vec<Step> {
        let in_version: Vec<(&Position, &Entry)> = self
            .entries
            .iter()
            .filter(|(position, _)| position.version == hop.version)
            .collect();
        let last_index = in_version.last().map(|(position, _)| position.index);

        in_version
            .into_iter()
            .filter(|(position, _)| after.is_none_or(|a| position.index > a))
            .map(|(position, entry)| Step {
                position: position.clone(),
                name: entry.name.clone(),
                last: Some(position.index) == last_index,
                next: hop.next.clone(),
                scriptlet: (entry.factory)(),
            })
            .collect()
    }

    /// All steps still to run from `(version, index)`, in position order.
    /// Nothing is pending once the position is complete.
    pub fn pending(&self, version: &Version, index: Option<u32>) -> Vec<Step> {
        if self.is_complete(version, index) {
            return Vec::new();
        }
        self.path(version)
            .iter()
            .flat_map(|hop| {
                let after = if hop.version == *version { index } else { None };
                self.steps(hop, after)
            })
            .collect()
    }

    /// True once the tracker has reached the target with no partial version.
    pub fn is_complete(&self, version: &Version, index: Option<u32>) -> bool {
        *version == self.target && index.is_none()
    }
}

/// Split `NN-Name.json` into `(NN, Name)`.
fn parse_scriptlet_filename(file_name: &str) -> Option<(u32, String)> {
    let stem = file_name.strip_suffix(".json")?;
    let (index, name) = stem.split_once('-')?;
    if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) || name.is_empty() {
        return None;
    }
    Some((index.parse().ok()?, name.to_string()))
}
