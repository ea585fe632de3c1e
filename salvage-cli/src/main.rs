//! Salvage: back up container stack definitions to a GitHub repository.
//!
//! # Usage
//!
//! ```text
//! salvage [--config <file>] [--log-level <filter>] sync [--dry-run] [--json]
//! salvage [--config <file>] diff
//! salvage [--config <file>] list [--json]
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use commands::{diff::DiffArgs, list::ListArgs, sync::SyncArgs};
use salvage_core::config;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "salvage",
    version,
    about = "Back up Docker Compose / Portainer stacks to a GitHub repository",
    long_about = None,
)]
struct Cli {
    /// Config file (default: ./salvage.yaml, then the user config dir).
    #[arg(long, global = true, env = "SALVAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `salvage_sync=trace`. Overrides LOG_LEVEL and RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Commit new and changed stacks to the repository.
    Sync(SyncArgs),

    /// Show a unified diff of what sync would commit.
    Diff(DiffArgs),

    /// List the stacks the configured source provides.
    List(ListArgs),
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logs go to stderr; stdout is reserved for command output.
fn init_tracing(level: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = level
        .and_then(|l| EnvFilter::try_new(l).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::load(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(cli.log_level.as_deref().or(settings.log_level.as_deref()));

    match cli.command {
        Commands::Sync(args) => args.run(settings),
        Commands::Diff(args) => args.run(settings),
        Commands::List(args) => args.run(settings),
    }
}
