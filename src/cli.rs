// src/cli.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "quay", version, about = "Package manager core", long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true, default_value = "/usr/local/etc/quay.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Install packages with their dependencies
    Install {
        /// Package names or origins
        #[arg(required = true)]
        packages: Vec<String>,

        /// Reinstall even if already installed
        #[arg(short, long)]
        force: bool,

        /// Plan only; change nothing
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Remove installed packages
    Delete {
        /// Package names or origins
        #[arg(required = true)]
        packages: Vec<String>,

        /// Also remove packages that depend on the named ones
        #[arg(short, long)]
        recursive: bool,

        /// Plan only; change nothing
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Download package archives into the cache without installing
    Fetch {
        /// Package names or origins
        #[arg(required = true)]
        packages: Vec<String>,
    },

    /// Refresh the remote package catalog
    Update {
        /// Refetch even if the remote copy is not newer
        #[arg(short, long)]
        force: bool,
    },

    /// List installed packages matching a pattern
    Info {
        /// Pattern; all packages when omitted
        pattern: Option<String>,

        /// Treat the pattern as a shell glob
        #[arg(short, long, conflicts_with = "regex")]
        glob: bool,

        /// Treat the pattern as a regular expression
        #[arg(short = 'x', long)]
        regex: bool,
    },

    /// Show package database statistics
    Stats,

    /// Compare two package versions
    Version {
        v1: String,
        v2: String,
    },

    /// Print a configuration value
    Config {
        key: String,
    },
}
