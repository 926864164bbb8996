//! srvupgrade Library
//!
//! Resumable, versioned upgrades for long-lived server instances. The
//! [`Upgrader`] walks an instance from the position stored in its
//! [`Tracker`] to a target version, one [`Scriptlet`] at a time, committing
//! progress after every successful step.

pub mod catalog;
pub mod cli;
pub mod config_file;
pub mod error;
pub mod instance;
pub mod properties;
pub mod scriptlet;
pub mod scriptlets;
pub mod tracker;
pub mod upgrade_state;
pub mod upgrader;
pub mod version;

// Re-export main types for convenience
pub use catalog::{Catalog, ScriptletFactory, VersionHop};
pub use config_file::UpgradeConfig;
pub use error::{Result, UpgradeError};
pub use instance::{Instance, InstanceInfo, ServerInstance, ServerSubsystem, Subsystem};
pub use properties::KeyValueFile;
pub use scriptlet::{Backup, Scriptlet, Step};
pub use scriptlets::{ConfigEditDefinition, ConfigEditScriptlet};
pub use tracker::{Tracker, TrackerReport};
pub use upgrade_state::{UpgradeContext, UpgradeStage, UpgradeTransitionError};
pub use upgrader::{UpgradeSettings, Upgrader};
pub use version::{Position, Version};
