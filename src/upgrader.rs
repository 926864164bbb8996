//! Upgrade orchestration.
//!
//! [`Upgrader`] drives one instance from the position recorded in its
//! tracker to the catalog's target version. Each step runs as a unit:
//!
//! 1. every subsystem is reloaded and passed to the per-subsystem hook
//! 2. the per-instance hook runs
//! 3. the tracker file is backed up and the step committed to the tracker
//!
//! Both hooks receive the step's [`Backup`] so files can be saved before
//! they are changed.
//!
//! If anything in a step fails, the tracker is left exactly where it was and
//! the next run starts again at the same step.

use std::path::PathBuf;

use anyhow::Context;
use tracing::{debug, error, info, warn, Level};

use crate::catalog::{Catalog, VersionHop};
use crate::error::{Result, UpgradeError};
use crate::instance::Instance;
use crate::scriptlet::{Backup, Step};
use crate::tracker::{Tracker, TrackerReport, DEFAULT_INDEX_KEY, DEFAULT_VERSION_KEY};
use crate::upgrade_state::{UpgradeContext, UpgradeStage};
use crate::version::Version;

/// Tracker file name inside the instance configuration directory.
pub const DEFAULT_TRACKER_FILE: &str = "tomcat.conf";

/// Directories and tracker layout for an upgrade run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeSettings {
    pub upgrade_dir: PathBuf,
    pub backup_dir: PathBuf,
    pub log_dir: PathBuf,
    pub tracker_file: String,
    pub version_key: String,
    pub index_key: String,
}

impl UpgradeSettings {
    pub fn new(
        upgrade_dir: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        log_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            upgrade_dir: upgrade_dir.into(),
            backup_dir: backup_dir.into(),
            log_dir: log_dir.into(),
            tracker_file: DEFAULT_TRACKER_FILE.to_string(),
            version_key: DEFAULT_VERSION_KEY.to_string(),
            index_key: DEFAULT_INDEX_KEY.to_string(),
        }
    }

    /// Log file an operator should read after a failed upgrade to `target`.
    pub fn log_file(&self, target: &Version) -> PathBuf {
        self.log_dir.join(format!("server-upgrade-{target}.log"))
    }
}

pub struct Upgrader<I: Instance> {
    instance: I,
    catalog: Catalog,
    tracker: Tracker,
    settings: UpgradeSettings,
    context: UpgradeContext,
}

impl<I: Instance> Upgrader<I> {
    pub fn new(instance: I, catalog: Catalog, settings: UpgradeSettings) -> Self {
        let tracker = Tracker::with_keys(
            format!("{} instance", instance.name()),
            instance.conf_dir().join(&settings.tracker_file),
            settings.version_key.clone(),
            settings.index_key.clone(),
        );

        Self {
            instance,
            catalog,
            tracker,
            settings,
            context: UpgradeContext::new(),
        }
    }

    pub fn instance(&self) -> &I {
        &self.instance
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    /// Protocol state of the current or last run.
    pub fn state(&self) -> &UpgradeContext {
        &self.context
    }

    pub fn get_target_version(&self) -> &Version {
        self.catalog.target()
    }

    /// Tracker version, or the target version for an instance that never
    /// recorded one (a fresh install starts out current).
    pub fn get_current_version(&self) -> Result<Version> {
        let current = match self.tracker.get_version()? {
            Some(version) => version,
            None => self.get_target_version().clone(),
        };
        debug!("Current version: {}", current);
        Ok(current)
    }

    pub fn get_current_index(&self) -> Result<Option<u32>> {
        self.tracker.get_index()
    }

    /// Steps a run would apply, in order.
    pub fn pending_steps(&self) -> Result<Vec<Step>> {
        let current = self.get_current_version()?;
        let index = self.get_current_index()?;
        Ok(self.catalog.pending(&current, index))
    }

    pub fn is_complete(&self) -> Result<bool> {
        let current = self.get_current_version()?;
        let index = self.get_current_index()?;
        Ok(self.catalog.is_complete(&current, index))
    }

    /// Apply every pending step. Returns the number of steps committed.
    pub fn run(&mut self) -> Result<usize> {
        self.context.reset();
        let result = self.run_steps();
        if result.is_err() && !self.context.current_stage().is_terminal() {
            let _ = self.context.fail();
        }
        result
    }

    fn run_steps(&mut self) -> Result<usize> {
        self.context.transition_to(UpgradeStage::ResolvingPosition)?;

        let current = self.get_current_version()?;
        let index = self.get_current_index()?;
        debug!("Target version: {}", self.get_target_version());

        if self.catalog.is_complete(&current, index) {
            info!(
                "{} instance is already at version {}",
                self.instance.name(),
                current
            );
            self.context.transition_to(UpgradeStage::Done)?;
            return Ok(0);
        }

        let path = self.catalog.path(&current);
        if path.is_empty() {
            warn!(
                "{} instance version {} is newer than target {}",
                self.instance.name(),
                current,
                self.get_target_version()
            );
        }

        for hop in &path {
            let after = if hop.version == current { index } else { None };
            let steps = self.catalog.steps(hop, after);
            if steps.is_empty() {
                self.skip_version(hop)?;
                continue;
            }
            for mut step in steps {
                self.run_scriptlet(&mut step)?;
            }
        }

        self.context.transition_to(UpgradeStage::Done)?;
        Ok(self.context.steps_committed())
    }

    /// Run one step and commit it. On failure the tracker is untouched and
    /// the error names the instance and the cause.
    ///
    /// Called outside of [`Upgrader::run`], this starts a new single-step run.
    pub fn run_scriptlet(&mut self, step: &mut Step) -> Result<()> {
        let stage = self.context.current_stage();
        if stage == UpgradeStage::Idle || stage.is_terminal() {
            self.context.reset();
            self.context.transition_to(UpgradeStage::ResolvingPosition)?;
        }
        self.context.transition_to(UpgradeStage::RunningStep)?;
        info!(
            "Upgrading {} instance to {}: {}",
            self.instance.name(),
            step.position,
            step.message()
        );

        if let Err(err) = self.apply_step(step) {
            if tracing::enabled!(Level::INFO) {
                error!("{:?}", err);
            } else {
                error!("{}", err);
            }
            error!("Failed upgrading {} instance.", self.instance.name());
            let _ = self.context.fail();

            return Err(UpgradeError::StepFailed {
                instance: self.instance.name().to_string(),
                position: step.position.clone(),
                source: err,
            });
        }
        Ok(())
    }

    fn apply_step(&mut self, step: &mut Step) -> anyhow::Result<()> {
        let backup = Backup::new(&self.settings.backup_dir, &step.position);
        self.upgrade_subsystems(step, &backup)?;

        info!("Upgrading {} instance", self.instance.name());
        step.scriptlet.upgrade_instance(&mut self.instance, &backup)?;

        self.update_tracker(step, &backup)
    }

    /// Reload each subsystem and run the per-subsystem hook on it, in
    /// enumeration order. Errors go straight to the caller.
    pub fn upgrade_subsystems(
        &mut self,
        step: &mut Step,
        backup: &Backup,
    ) -> anyhow::Result<()> {
        let info = self.instance.info();
        for subsystem in self.instance.subsystems_mut() {
            info!("Upgrading {} subsystem", subsystem.name());

            subsystem
                .load()
                .with_context(|| format!("failed to reload {} subsystem", subsystem.name()))?;
            step.scriptlet
                .upgrade_subsystem(&info, &mut **subsystem, backup)?;
        }
        Ok(())
    }

    /// Back up and commit a step whose hooks have succeeded.
    ///
    /// A non-last step records its index. The last step of a version clears
    /// the index and moves the tracker to the successor version in a single
    /// file replace.
    pub fn update_tracker(&mut self, step: &mut Step, backup: &Backup) -> anyhow::Result<()> {
        self.context.transition_to(UpgradeStage::Committing)?;

        step.scriptlet
            .backup(backup, self.tracker.filename())
            .with_context(|| format!("failed to back up {}", step.position))?;

        if !step.last {
            self.tracker.set_index(step.index())?;
        } else {
            self.tracker.set(step.successor())?;
        }

        self.context.record_commit()?;
        Ok(())
    }

    /// Move past a version that has nothing left to apply.
    fn skip_version(&mut self, hop: &VersionHop) -> Result<()> {
        self.context.transition_to(UpgradeStage::Committing)?;
        info!(
            "No upgrade scriptlets left for version {}, moving to {}",
            hop.version, hop.next
        );
        self.tracker.set(&hop.next)
    }

    /// Fail unless the tracker has reached the target version.
    pub fn validate(&self) -> Result<()> {
        if self.is_complete()? {
            return Ok(());
        }
        let log_file = self.settings.log_file(self.get_target_version());
        Err(UpgradeError::Incomplete { log_file })
    }

    pub fn show_tracker(&self) -> Result<TrackerReport> {
        self.tracker.show()
    }

    pub fn set_tracker(&self, version: &Version) -> Result<()> {
        self.tracker.set(version)
    }

    pub fn remove_tracker(&self) -> Result<()> {
        self.tracker.remove()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::Subsystem;
    use std::path::Path;

    struct Bare {
        conf_dir: PathBuf,
        subsystems: Vec<Box<dyn Subsystem>>,
    }

    impl Instance for Bare {
        fn name(&self) -> &str {
            "bare"
        }

        fn conf_dir(&self) -> &Path {
            &self.conf_dir
        }

        fn subsystems_mut(&mut self) -> &mut [Box<dyn Subsystem>] {
            &mut self.subsystems
        }
    }

    fn upgrader(root: &Path, target: &str) -> Upgrader<Bare> {
        let instance = Bare {
            conf_dir: root.join("conf"),
            subsystems: Vec::new(),
        };
        let settings = UpgradeSettings::new(root.join("upgrade"), root.join("backup"), root.join("log"));
        Upgrader::new(instance, Catalog::new(Version::parse(target).unwrap()), settings)
    }

    #[test]
    fn test_log_file_path() {
        let settings = UpgradeSettings::new("/u", "/b", "/var/log/srv");
        assert_eq!(
            settings.log_file(&Version::parse("1.1").unwrap()),
            PathBuf::from("/var/log/srv/server-upgrade-1.1.log")
        );
    }

    #[test]
    fn test_tracker_lives_in_conf_dir() {
        let root = tempfile::tempdir().unwrap();
        let u = upgrader(root.path(), "1.0");
        assert_eq!(u.tracker().filename(), root.path().join("conf/tomcat.conf"));
        assert_eq!(u.tracker().name(), "bare instance");
    }

    #[test]
    fn test_fresh_instance_is_current() {
        let root = tempfile::tempdir().unwrap();
        let mut u = upgrader(root.path(), "1.0");

        assert_eq!(u.get_current_version().unwrap(), Version::parse("1.0").unwrap());
        assert_eq!(u.run().unwrap(), 0);
        assert_eq!(u.state().current_stage(), UpgradeStage::Done);
        u.validate().unwrap();
    }

    #[test]
    fn test_version_without_steps_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        let mut u = upgrader(root.path(), "2.0");
        u.set_tracker(&Version::parse("1.0").unwrap()).unwrap();

        assert_eq!(u.run().unwrap(), 0);
        assert_eq!(
            u.tracker().get_version().unwrap(),
            Some(Version::parse("2.0").unwrap())
        );
        u.validate().unwrap();
    }

    #[test]
    fn test_tracker_above_target_is_incomplete() {
        let root = tempfile::tempdir().unwrap();
        let mut u = upgrader(root.path(), "1.0");
        u.set_tracker(&Version::parse("2.0").unwrap()).unwrap();

        assert_eq!(u.run().unwrap(), 0);
        assert_eq!(
            u.tracker().get_version().unwrap(),
            Some(Version::parse("2.0").unwrap())
        );
        assert!(matches!(u.validate(), Err(UpgradeError::Incomplete { .. })));
    }

    #[test]
    fn test_validate_reports_log_file() {
        let root = tempfile::tempdir().unwrap();
        let u = upgrader(root.path(), "2.0");
        u.set_tracker(&Version::parse("1.0").unwrap()).unwrap();

        match u.validate() {
            Err(UpgradeError::Incomplete { log_file }) => {
                assert_eq!(log_file, root.path().join("log/server-upgrade-2.0.log"));
            }
            other => panic!("expected incomplete error, got {other:?}"),
        }
    }
}
