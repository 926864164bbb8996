//! Shared fixtures for upgrade tests: an in-memory instance and a scriptlet
//! that records every hook call.

#![allow(dead_code)]

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use srvupgrade::{
    Backup, Catalog, Instance, InstanceInfo, KeyValueFile, Scriptlet, Subsystem, UpgradeSettings,
    Upgrader, Version,
};

pub type Events = Rc<RefCell<Vec<String>>>;

pub fn events() -> Events {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn v(s: &str) -> Version {
    Version::parse(s).expect("valid version")
}

pub struct MemorySubsystem {
    name: String,
    config: KeyValueFile,
    events: Events,
}

impl Subsystem for MemorySubsystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&mut self) -> srvupgrade::Result<()> {
        self.events.borrow_mut().push(format!("load:{}", self.name));
        Ok(())
    }

    fn config(&self) -> &KeyValueFile {
        &self.config
    }

    fn config_mut(&mut self) -> &mut KeyValueFile {
        &mut self.config
    }

    fn save(&mut self) -> srvupgrade::Result<()> {
        Ok(())
    }
}

pub struct MemoryInstance {
    conf_dir: PathBuf,
    subsystems: Vec<Box<dyn Subsystem>>,
}

impl MemoryInstance {
    pub fn new(conf_dir: &Path, subsystems: &[&str], events: &Events) -> Self {
        Self {
            conf_dir: conf_dir.to_path_buf(),
            subsystems: subsystems
                .iter()
                .map(|name| {
                    Box::new(MemorySubsystem {
                        name: name.to_string(),
                        config: KeyValueFile::new(conf_dir.join(format!("{name}.cfg"))),
                        events: events.clone(),
                    }) as Box<dyn Subsystem>
                })
                .collect(),
        }
    }
}

impl Instance for MemoryInstance {
    fn name(&self) -> &str {
        "pki-tomcat"
    }

    fn conf_dir(&self) -> &Path {
        &self.conf_dir
    }

    fn subsystems_mut(&mut self) -> &mut [Box<dyn Subsystem>] {
        &mut self.subsystems
    }
}

/// Where a recording scriptlet should fail, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailAt {
    Nowhere,
    Subsystem(String),
    Instance,
    Backup,
}

pub struct Recording {
    label: String,
    events: Events,
    fail: FailAt,
}

impl Scriptlet for Recording {
    fn message(&self) -> &str {
        &self.label
    }

    fn upgrade_subsystem(
        &mut self,
        _instance: &InstanceInfo,
        subsystem: &mut dyn Subsystem,
        _backup: &Backup,
    ) -> anyhow::Result<()> {
        self.events
            .borrow_mut()
            .push(format!("{}:subsystem:{}", self.label, subsystem.name()));
        if self.fail == FailAt::Subsystem(subsystem.name().to_string()) {
            anyhow::bail!("{} broke {}", self.label, subsystem.name());
        }
        Ok(())
    }

    fn upgrade_instance(
        &mut self,
        instance: &mut dyn Instance,
        _backup: &Backup,
    ) -> anyhow::Result<()> {
        self.events
            .borrow_mut()
            .push(format!("{}:instance:{}", self.label, instance.name()));
        if self.fail == FailAt::Instance {
            anyhow::bail!("{} broke the instance", self.label);
        }
        Ok(())
    }

    fn backup(&mut self, backup: &Backup, tracker_file: &Path) -> anyhow::Result<()> {
        if self.fail == FailAt::Backup {
            anyhow::bail!("{} could not back up {}", self.label, tracker_file.display());
        }
        backup.save(tracker_file)
    }
}

/// Catalog of recording scriptlets. `failing` makes one position fail.
pub fn recording_catalog(
    target: &str,
    steps: &[(&str, u32)],
    events: &Events,
    failing: Option<(&str, u32, FailAt)>,
) -> Catalog {
    let mut catalog = Catalog::new(v(target));
    for (version, index) in steps {
        let label = format!("{version}/{index}");
        let fail = match &failing {
            Some((fv, fi, at)) if v(fv) == v(version) && fi == index => at.clone(),
            _ => FailAt::Nowhere,
        };
        let events = events.clone();
        catalog
            .add(v(version), *index, format!("Step{index}"), move || {
                Box::new(Recording {
                    label: label.clone(),
                    events: events.clone(),
                    fail: fail.clone(),
                }) as Box<dyn Scriptlet>
            })
            .expect("unique position");
    }
    catalog
}

pub fn settings(root: &Path) -> UpgradeSettings {
    UpgradeSettings::new(root.join("upgrade"), root.join("backup"), root.join("log"))
}

pub fn upgrader(
    root: &Path,
    subsystems: &[&str],
    catalog: Catalog,
    events: &Events,
) -> Upgrader<MemoryInstance> {
    let instance = MemoryInstance::new(&root.join("conf"), subsystems, events);
    Upgrader::new(instance, catalog, settings(root))
}

/// Recorded `(version, index)` read straight from the tracker.
pub fn tracker_position(upgrader: &Upgrader<MemoryInstance>) -> (Version, Option<u32>) {
    let tracker = upgrader.tracker();
    (
        tracker.get_version().unwrap().expect("tracker version set"),
        tracker.get_index().unwrap(),
    )
}
