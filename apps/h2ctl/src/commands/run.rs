//! `h2ctl run`: bring a server up around a command.

use crate::cli::RunArgs;
use crate::error::H2ctlError;

use common::ErrorLocation;
use lifecycle_core::config::{ENV_HOST, ENV_TCP_PORT, ENV_WEB_PORT, LifecycleConfig};
use lifecycle_core::error::LifecycleError;
use lifecycle_core::{LifecycleManager, with_database};
use models::{ServerConfig, ServerInfo};

use std::panic::Location;
use std::process::{ExitCode, ExitStatus};

use log::{info, warn};
use tokio::process::Command as TokioCommand;
use tokio::signal::ctrl_c;

/// Environment variable carrying the server's TCP URL to the wrapped command.
pub const ENV_TCP_URL: &str = "H2_TCP_URL";

pub async fn execute(config: &LifecycleConfig, args: &RunArgs) -> Result<ExitCode, H2ctlError> {
    let server = server_config(config, args)?;
    let ready_timeout = match args.ready_timeout {
        Some(timeout) => timeout,
        None => config.ready_timeout()?,
    };

    let mut manager =
        LifecycleManager::with_options(config.launcher.clone(), config.manager_options()?);

    let command = args.command.clone();
    with_database(&mut manager, server, ready_timeout, |info| async move {
        info!(
            "Database ready on {}:{} (PID {})",
            info.host, info.port, info.pid
        );

        match command.split_first() {
            Some((program, rest)) => run_command(program, rest, &info).await,
            None => wait_for_interrupt().await,
        }
    })
    .await
}

/// Server config from the file, with command-line overrides applied.
pub fn server_config(config: &LifecycleConfig, args: &RunArgs) -> Result<ServerConfig, H2ctlError> {
    let mut server = config.server_config()?;

    if let Some(port) = args.port {
        server.port = port;
    }
    if let Some(ref dir) = args.data_dir {
        server.data_dir = dir.clone();
    }

    server.validate().map_err(LifecycleError::from)?;
    Ok(server)
}

/// The server URL handed to wrapped commands: the announced one if the
/// server printed a banner, otherwise built from host and port.
pub fn tcp_url(info: &ServerInfo) -> String {
    info.announced_url
        .clone()
        .unwrap_or_else(|| format!("tcp://{}:{}", info.host, info.port))
}

async fn run_command(
    program: &str,
    args: &[String],
    info: &ServerInfo,
) -> Result<ExitCode, H2ctlError> {
    info!("Running {program} {}", args.join(" "));

    let mut cmd = TokioCommand::new(program);
    cmd.args(args)
        .env(ENV_HOST, &info.host)
        .env(ENV_TCP_PORT, info.port.to_string())
        .env(ENV_TCP_URL, tcp_url(info))
        .kill_on_drop(true);
    if let Some(web_port) = info.web_port {
        cmd.env(ENV_WEB_PORT, web_port.to_string());
    }

    let status = cmd.status().await.map_err(|e| H2ctlError::Command {
        message: format!("Failed to run {program}: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    Ok(exit_code(program, status))
}

fn exit_code(program: &str, status: ExitStatus) -> ExitCode {
    match status.code() {
        Some(0) => ExitCode::SUCCESS,
        Some(code) => {
            warn!("{program} exited with code {code}");
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        }
        None => {
            warn!("{program} was terminated by a signal");
            ExitCode::FAILURE
        }
    }
}

async fn wait_for_interrupt() -> Result<ExitCode, H2ctlError> {
    info!("Press Ctrl-C to stop the database");

    ctrl_c().await.map_err(|e| H2ctlError::H2ctl {
        message: format!("Failed to listen for Ctrl-C: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    info!("Interrupted, stopping");
    Ok(ExitCode::SUCCESS)
}
