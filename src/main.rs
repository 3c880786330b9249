//! dockbridge: Docker API proxy for a daemon running inside a VM.
//!
//! This is the main entry point for the dockbridge binary. It handles CLI
//! argument parsing, tracing initialization and configuration loading, then
//! hands off to the orchestrator.
//!
//! # Logging
//!
//! - **Diagnostic logging**: stderr via `tracing`, level chosen by `-v` or `RUST_LOG`
//! - **Audit logging**: JSON events to syslog when `--syslog` (or
//!   `[general] syslog = true`) is set

use anyhow::{Context, Result};
use clap::Parser;
use dockbridge::{cli::Cli, config::ConfigLoader, orchestrator::Orchestrator};
use tracing::debug;

fn main() -> Result<()> {
    // Parse CLI arguments first (before any other initialization)
    let cli = Cli::parse();

    init_tracing(cli.verbose)?;

    debug!("Parsed CLI arguments: {:?}", cli);

    let settings = ConfigLoader::new()
        .load_settings(&cli)
        .context("Failed to load configuration")?;

    debug!("Resolved settings: {:?}", settings);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to create Tokio runtime")?;

    runtime.block_on(Orchestrator::new(settings).run())
}

/// Initialize the tracing subscriber for diagnostic logging.
///
/// # Verbosity Levels
/// - 0 (default): `RUST_LOG` if set, otherwise info
/// - 1 (-v): Debug level
/// - 2+ (-vv): Trace level
fn init_tracing(verbose: u8) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
