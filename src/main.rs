//! srvupgrade - command-line entry point
//!
//! Loads the configuration, opens the instance and its scriptlet catalog,
//! then runs the selected command.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use srvupgrade::cli::{Cli, Commands, TrackerCommands};
use srvupgrade::{Catalog, ServerInstance, UpgradeConfig, Upgrader, Version};

/// Initialize logging to stderr, plus a plain-text copy in `log_file` when
/// it can be opened.
fn init_logging(cli: &Cli, log_file: Option<&Path>) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));

    let mut file_error = None;
    let file_layer = log_file.and_then(|path| {
        let opened = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|()| OpenOptions::new().create(true).append(true).open(path));
        match opened {
            Ok(file) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            ),
            Err(e) => {
                file_error = Some(format!("Cannot write log file {}: {}", path.display(), e));
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    if let Some(message) = file_error {
        warn!("{}", message);
    }
}

fn load_config(cli: &Cli) -> Result<UpgradeConfig> {
    let mut config = match &cli.config {
        Some(path) => UpgradeConfig::load_from_file(path)?,
        None => UpgradeConfig::default(),
    };
    cli.apply_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    let target = config.target()?;
    let settings = config.settings();
    let command = cli.command();

    let log_file = (command == Commands::Upgrade).then(|| settings.log_file(&target));
    init_logging(&cli, log_file.as_deref());
    debug!("Configuration: {:?}", config);

    let instance = ServerInstance::open(&cli.instance)
        .with_context(|| format!("Failed to open instance {}", cli.instance.display()))?;
    let catalog = Catalog::from_dir(&settings.upgrade_dir, target)
        .with_context(|| format!("Failed to load scriptlets from {}", settings.upgrade_dir.display()))?;
    let mut upgrader = Upgrader::new(instance, catalog, settings);

    match command {
        Commands::Upgrade => {
            info!("Upgrading {} instance", upgrader.instance());
            let applied = upgrader.run()?;
            upgrader.validate()?;
            if applied > 0 {
                println!(
                    "Upgraded {} instance to {} ({} scriptlets applied)",
                    upgrader.instance(),
                    upgrader.get_target_version(),
                    applied
                );
            }
        }
        Commands::Status => {
            println!("Instance: {}", upgrader.instance());
            println!("Current version: {}", upgrader.get_current_version()?);
            if let Some(index) = upgrader.get_current_index()? {
                println!("Last completed scriptlet: {index}");
            }
            println!("Target version: {}", upgrader.get_target_version());

            let pending = upgrader.pending_steps()?;
            if pending.is_empty() {
                println!("No pending scriptlets");
            } else {
                println!("Pending scriptlets:");
                for step in &pending {
                    println!(
                        "  {}/{:02}-{}: {}",
                        step.version(),
                        step.index(),
                        step.name,
                        step.message()
                    );
                }
            }
        }
        Commands::Tracker { action } => match action {
            TrackerCommands::Show => print!("{}", upgrader.show_tracker()?),
            TrackerCommands::Set { version } => {
                let version = Version::parse(&version)?;
                upgrader.set_tracker(&version)?;
                println!("Tracker set to version {version}");
            }
            TrackerCommands::Remove => {
                upgrader.remove_tracker()?;
                println!("Tracker removed");
            }
        },
    }

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::FAILURE
        }
    }
}
