//! Command-line interface definitions for dockbridge.
//!
//! Uses clap's derive API for type-safe argument parsing. Every flag is
//! optional; unset values fall back to the config files, then to defaults.

use clap::Parser;
use std::path::PathBuf;

/// Docker API proxy for a daemon running inside a VM.
///
/// dockbridge listens for Docker clients locally, rewrites Windows-style
/// bind mounts and environment paths in container-create requests so they
/// resolve on the VM's shared folder, and bridges published ports from
/// localhost to the VM.
#[derive(Parser, Debug, Default)]
#[command(name = "dockbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Address of the VM running the Docker daemon.
    ///
    /// Published ports are bridged to the same host.
    #[arg(long = "ip", value_name = "HOST")]
    pub ip: Option<String>,

    /// Docker daemon port on the VM.
    #[arg(long = "vm-port", value_name = "PORT")]
    pub vm_port: Option<u16>,

    /// Local port to accept Docker clients on.
    #[arg(long = "local-port", value_name = "PORT")]
    pub local_port: Option<u16>,

    /// Path prefix on the VM under which drive letters are mounted.
    ///
    /// `C:\data` becomes `<base>C/data`.
    #[arg(long = "base", value_name = "PATH")]
    pub base: Option<String>,

    /// Path to additional config file.
    ///
    /// This config file is merged on top of system and user configs,
    /// giving it the highest priority (except for CLI flags).
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Send audit events to the local syslog daemon.
    #[arg(long = "syslog")]
    pub syslog: bool,

    /// Increase log verbosity.
    ///
    /// Can be specified multiple times:
    /// -v    = debug level
    /// -vv   = trace level
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}
