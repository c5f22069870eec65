use crate::logger::{LOG_LEVEL, VERBOSE_LOG_LEVEL};

use lifecycle_core::config::CONFIG_FILE_NAME;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use humantime::parse_duration;
use log::LevelFilter;

#[derive(Debug, Parser)]
#[command(
    name = "h2ctl",
    version,
    about = "Start, probe and stop H2 database servers for builds and tests"
)]
pub struct Cli {
    /// Config file; defaults are used when it doesn't exist
    #[arg(long, short = 'c', global = true, default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Also write logs to `h2ctl.log` in this directory
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            VERBOSE_LOG_LEVEL
        } else {
            LOG_LEVEL
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a server, wait until it is ready, run a command against it, stop it
    Run(RunArgs),
    /// Wait until a server accepts TCP connections
    Check(CheckArgs),
    /// Shut a server down, falling back to the PID in its data directory's lock file
    Stop(StopArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// TCP port, overrides the config file
    #[arg(long)]
    pub port: Option<u16>,

    /// Data directory, overrides the config file
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Readiness timeout such as `30s`, overrides the config file
    #[arg(long, value_parser = parse_duration)]
    pub ready_timeout: Option<Duration>,

    /// Command to run once the server is ready; without one, waits for Ctrl-C
    #[arg(last = true)]
    pub command: Vec<String>,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Args)]
pub struct StopArgs {
    /// TCP port of the server to shut down, overrides the config file
    #[arg(long)]
    pub port: Option<u16>,

    /// Data directory holding the lock file, overrides the config file
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}
