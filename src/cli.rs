// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "Multi-site release deployment with locking, backups, and rollback")]
#[command(version)]
pub struct Cli {
    /// Path to the sites file (default: sites.yml, sites.yaml, .stagehand/sites.yml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print final results
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Deploy a new release of one site
    Deploy {
        /// Site identifier (as listed in the sites file)
        site: String,
    },

    /// Deploy every configured site
    DeployAll {
        /// Number of sites to process concurrently
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,
    },

    /// Point a site back at its previous release
    Rollback {
        site: String,
    },

    /// Roll back every configured site
    RollbackAll {
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,
    },

    /// Remove a site's deploy lock left behind by an interrupted run
    Unlock {
        site: String,
    },

    /// Remove the deploy lock of every configured site
    UnlockAll {
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,
    },

    /// Run a site's restart scripts
    Restart {
        site: String,
    },

    /// Run the restart scripts of every configured site
    RestartAll {
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,
    },

    /// List configured sites
    List,
}
