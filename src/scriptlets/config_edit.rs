//! Declarative configuration-edit scriptlets.
//!
//! Scriptlet files in an upgrade directory are JSON documents:
//!
//! ```json
//! {
//!   "message": "Rename audit log settings",
//!   "subsystem": {
//!     "only": ["ca"],
//!     "rename": { "log.instance.SignedAudit.fileName": "log.instance.SignedAudit.path" },
//!     "set": { "log.instance.SignedAudit.bufferSize": "512" },
//!     "remove": ["log.instance.SignedAudit.legacy"]
//!   },
//!   "instance": {
//!     "file": "tomcat.conf",
//!     "set": { "JAVA_OPTS": "-Xmx1g" }
//!   }
//! }
//! ```
//!
//! Edits are applied as rename, then set, then remove. Every file the
//! scriptlet writes is saved into the step's backup directory first; a file
//! it creates is listed there as new.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, UpgradeError};
use crate::instance::{Instance, InstanceInfo, Subsystem};
use crate::properties::KeyValueFile;
use crate::scriptlet::{Backup, Scriptlet};

/// Key edits applied to one key/value file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEdits {
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
    #[serde(default)]
    pub set: BTreeMap<String, String>,
    #[serde(default)]
    pub remove: Vec<String>,
}

impl ConfigEdits {
    pub fn is_empty(&self) -> bool {
        self.rename.is_empty() && self.set.is_empty() && self.remove.is_empty()
    }

    /// Apply the edits, returning true if the file changed.
    pub fn apply(&self, file: &mut KeyValueFile) -> bool {
        let before = file.to_text();
        for (from, to) in &self.rename {
            file.rename(from, to);
        }
        for (key, value) in &self.set {
            file.set(key, value.clone());
        }
        for key in &self.remove {
            file.remove(key);
        }
        before != file.to_text()
    }
}

/// Edits for every subsystem, optionally restricted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemEdits {
    #[serde(default)]
    pub only: Option<Vec<String>>,
    #[serde(flatten)]
    pub edits: ConfigEdits,
}

impl SubsystemEdits {
    fn applies_to(&self, name: &str) -> bool {
        self.only
            .as_ref()
            .is_none_or(|names| names.iter().any(|n| n == name))
    }
}

/// Edits for a file in the instance configuration directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceEdits {
    pub file: String,
    #[serde(flatten)]
    pub edits: ConfigEdits,
}

/// Parsed scriptlet file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEditDefinition {
    pub message: String,
    #[serde(default)]
    pub subsystem: Option<SubsystemEdits>,
    #[serde(default)]
    pub instance: Option<InstanceEdits>,
}

impl ConfigEditDefinition {
    pub fn from_json(raw: &str) -> Result<Self> {
        let definition: Self = serde_json::from_str(raw)?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw).map_err(|e| {
            UpgradeError::catalog(format!("invalid scriptlet {}: {e}", path.display()))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.message.trim().is_empty() {
            return Err(UpgradeError::catalog("scriptlet message must not be empty"));
        }
        if let Some(instance) = &self.instance {
            let path = Path::new(&instance.file);
            let plain = !instance.file.is_empty()
                && path.components().all(|c| matches!(c, Component::Normal(_)));
            if !plain {
                return Err(UpgradeError::catalog(format!(
                    "instance file must be relative to the configuration directory: {:?}",
                    instance.file
                )));
            }
        }
        Ok(())
    }
}

/// Scriptlet applying a [`ConfigEditDefinition`].
#[derive(Debug, Clone)]
pub struct ConfigEditScriptlet {
    definition: ConfigEditDefinition,
}

impl ConfigEditScriptlet {
    pub fn new(definition: ConfigEditDefinition) -> Self {
        Self { definition }
    }
}

impl Scriptlet for ConfigEditScriptlet {
    fn message(&self) -> &str {
        &self.definition.message
    }

    fn upgrade_subsystem(
        &mut self,
        instance: &InstanceInfo,
        subsystem: &mut dyn Subsystem,
        backup: &Backup,
    ) -> anyhow::Result<()> {
        let Some(edits) = &self.definition.subsystem else {
            return Ok(());
        };
        if !edits.applies_to(subsystem.name()) {
            return Ok(());
        }

        if edits.edits.apply(subsystem.config_mut()) {
            info!("Updating {} subsystem in {} instance", subsystem.name(), instance);
            backup.save(subsystem.config().path())?;
            subsystem
                .save()
                .with_context(|| format!("failed to save {} subsystem", subsystem.name()))?;
        }
        Ok(())
    }

    fn upgrade_instance(
        &mut self,
        instance: &mut dyn Instance,
        backup: &Backup,
    ) -> anyhow::Result<()> {
        let Some(edits) = &self.definition.instance else {
            return Ok(());
        };

        let path = instance.conf_dir().join(&edits.file);
        let mut file = KeyValueFile::load(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        if edits.edits.apply(&mut file) {
            info!("Updating {} in {} instance", edits.file, instance.name());
            backup.save(&path)?;
            file.store()
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        Ok(())
    }
}
