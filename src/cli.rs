use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config_file::UpgradeConfig;

/// srvupgrade - Upgrade a server instance to the installed version
#[derive(Parser, Debug)]
#[command(name = "srvupgrade")]
#[command(about = "Apply pending upgrade scriptlets to a server instance")]
#[command(version)]
pub struct Cli {
    /// Path to a JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Show progress messages (full error traces on failure)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Show debug messages
    #[arg(long, global = true, conflicts_with = "verbose")]
    pub debug: bool,

    /// Override the scriptlet directory
    #[arg(long, global = true)]
    pub upgrade_dir: Option<PathBuf>,

    /// Override the backup directory
    #[arg(long, global = true)]
    pub backup_dir: Option<PathBuf>,

    /// Override the log directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Override the target version
    #[arg(long, global = true)]
    pub target: Option<String>,

    /// Instance directory (contains conf/ and one directory per subsystem)
    pub instance: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Apply all pending scriptlets, then verify the instance is current
    Upgrade,
    /// Show current and target versions and the pending scriptlets
    Status,
    /// Inspect or reset the upgrade tracker
    Tracker {
        #[command(subcommand)]
        action: TrackerCommands,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TrackerCommands {
    /// Show the recorded version and scriptlet index
    Show,
    /// Force the recorded version (clears the index)
    Set {
        /// Version to record
        version: String,
    },
    /// Remove all tracker state
    Remove,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Subcommand to run; upgrading is the default
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Upgrade)
    }

    /// Apply command-line overrides on top of a loaded configuration
    pub fn apply_overrides(&self, config: &mut UpgradeConfig) {
        if let Some(dir) = &self.upgrade_dir {
            config.upgrade_dir = dir.clone();
        }
        if let Some(dir) = &self.backup_dir {
            config.backup_dir = dir.clone();
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.clone();
        }
        if let Some(target) = &self.target {
            config.target_version = target.clone();
        }
    }

    /// Default log level for the selected verbosity
    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else {
            "warn"
        }
    }
}
