//! Quire - a static site generator for Markdown documentation.

mod build;
mod check;
mod cli;
mod config;
mod layout;
mod logger;
mod model;
mod pipes;
mod serve;
mod site;
mod theme;
mod utils;
mod watch;

use anyhow::{Context, Result, bail};
use build::{build_site, clean};
use check::check_site;
use clap::Parser;
use cli::{Cli, Commands};
use config::SiteConfig;
use serve::serve_site;
use watch::{Rebuilder, watch};

fn main() -> Result<()> {
    let cli: &'static Cli = Box::leak(Box::new(Cli::parse()));
    let config: &'static SiteConfig = Box::leak(Box::new(load_config(cli)?));

    match &cli.command {
        Commands::Build { .. } => build_site(config).map(|_| ()),
        Commands::Watch { .. } => watch_site(config),
        Commands::Serve { .. } => serve_site(config),
        Commands::Check { strict, .. } => {
            let target = config.paths().target();
            if !target.is_dir() {
                bail!("Nothing to check: `{}` does not exist", target.display());
            }
            let report = check_site(config)?;
            if *strict && !report.broken.is_empty() {
                bail!("{} broken links", report.broken.len());
            }
            Ok(())
        }
        Commands::Clean => clean(config),
    }
}

/// Load and validate configuration from CLI arguments.
///
/// A missing config file means defaults plus CLI overrides.
fn load_config(cli: &'static Cli) -> Result<SiteConfig> {
    let root = cli.root.as_deref().unwrap_or(std::path::Path::new("./"));
    let config_path = root.join(&cli.config);

    let mut config = if config_path.exists() {
        SiteConfig::from_path(&config_path)?
    } else {
        SiteConfig::default()
    };
    config.update_with_cli(cli);

    if matches!(
        cli.command,
        Commands::Build { .. } | Commands::Watch { .. } | Commands::Serve { .. }
    ) {
        config.validate()?;
    }

    Ok(config)
}

/// Build once, then keep the target in sync until Ctrl+C.
fn watch_site(config: &'static SiteConfig) -> Result<()> {
    let mut rebuilder = Rebuilder::new(build_site(config)?, None);
    let handle = watch(
        config.paths().source(),
        move |event| rebuilder.react(event),
        || {},
    )?;

    if !handle.is_active() {
        return Ok(());
    }

    let stopper = handle.stopper();
    ctrlc::set_handler(move || stopper.stop()).context("Failed to set Ctrl+C handler")?;

    handle.join()
}
