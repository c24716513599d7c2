// src/main.rs

use clap::Parser;
use quay::cli::{Cli, Commands};
use quay::commands;
use quay::config::Config;
use quay::error::{ExitStatus, Result};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("quay: {e}");
            std::process::exit(ExitStatus::from(&e).code());
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Install {
            packages,
            force,
            dry_run,
        } => commands::install(&config, &packages, force, dry_run),
        Commands::Delete {
            packages,
            recursive,
            dry_run,
        } => commands::delete(&config, &packages, recursive, dry_run),
        Commands::Fetch { packages } => commands::fetch(&config, &packages),
        Commands::Update { force } => commands::update(&config, force),
        Commands::Info {
            pattern,
            glob,
            regex,
        } => commands::info(&config, pattern.as_deref(), glob, regex),
        Commands::Stats => commands::stats(&config),
        Commands::Version { v1, v2 } => commands::version(&v1, &v2),
        Commands::Config { key } => commands::config_value(&config, &key),
    }
}
