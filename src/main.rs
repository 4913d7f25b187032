// ABOUTME: Entry point for the stagehand CLI application.
// ABOUTME: Parses arguments, sets up logging, and dispatches to command handlers.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use commands::{CommandContext, Selection};
use stagehand::config::{HostOverride, SitesConfig};
use stagehand::deploy::Operation;
use stagehand::error::Result;
use stagehand::output::{Output, OutputMode};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose.
    let default_filter = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let output = Output::new(mode);

    if let Err(e) = run(cli, output).await {
        Output::new(mode).error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: Output) -> Result<()> {
    let config = match &cli.config {
        Some(path) => SitesConfig::load(path)?,
        None => SitesConfig::discover(&env::current_dir()?)?,
    };

    let overrides = HostOverride::from_env()?;
    let (operation, selection, jobs) = match &cli.command {
        Commands::List => {
            commands::list(&config, &overrides, &output);
            return Ok(());
        }
        Commands::Deploy { site } => (Operation::Deploy, Selection::One(site), 1),
        Commands::DeployAll { jobs } => (Operation::Deploy, Selection::All, *jobs),
        Commands::Rollback { site } => (Operation::Rollback, Selection::One(site), 1),
        Commands::RollbackAll { jobs } => (Operation::Rollback, Selection::All, *jobs),
        Commands::Unlock { site } => (Operation::Unlock, Selection::One(site), 1),
        Commands::UnlockAll { jobs } => (Operation::Unlock, Selection::All, *jobs),
        Commands::Restart { site } => (Operation::Restart, Selection::One(site), 1),
        Commands::RestartAll { jobs } => (Operation::Restart, Selection::All, *jobs),
    };

    let ctx = CommandContext::new(config, overrides, output);
    commands::run(ctx, operation, selection, jobs).await
}
