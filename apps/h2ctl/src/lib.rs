// Library exports for testing
// The binary (main.rs) imports these as well

pub mod cli;
pub mod commands;
pub mod error;
pub mod logger;

#[cfg(test)]
mod tests;

use cli::{Cli, Command};
use error::H2ctlError;

use lifecycle_core::config::LifecycleConfig;

use std::process::ExitCode;

use log::debug;

/// Load configuration and dispatch the selected subcommand.
pub async fn run(cli: Cli) -> Result<ExitCode, H2ctlError> {
    let mut config = LifecycleConfig::load(&cli.config)?;
    config.apply_env_overrides()?;
    debug!("Effective launcher: {:?}", config.launcher);

    match cli.command {
        Command::Run(ref args) => commands::run::execute(&config, args).await,
        Command::Check(ref args) => commands::check::execute(&config, args).await,
        Command::Stop(ref args) => commands::stop::execute(&config, args).await,
        Command::Config => commands::config::execute(&config),
    }
}
