//! `h2ctl stop`: shut down a server this invocation did not start.
//!
//! The launcher's shutdown command goes first (H2's `-tcpShutdown` works
//! without any lock file). When there is none, or it fails, the PID recorded
//! in the data directory's lock file is signalled instead.

use crate::cli::StopArgs;
use crate::error::H2ctlError;

use common::ErrorLocation;
use lifecycle_core::config::LifecycleConfig;
use lifecycle_core::error::{ConfigError, LifecycleError};
use lifecycle_core::launcher::{ServerLauncher, request_shutdown};
use lifecycle_core::lock::stop_recorded_server;
use models::ServerConfig;

use std::panic::Location;
use std::path::Path;
use std::process::ExitCode;

use log::{info, warn};

pub async fn execute(config: &LifecycleConfig, args: &StopArgs) -> Result<ExitCode, H2ctlError> {
    let server = server_config(config, args)?;

    if let Some(shutdown) = config.launcher.shutdown_command(&server) {
        if request_shutdown(&shutdown, config.stop_grace()?).await {
            info!("Server on {} acknowledged shutdown", server.address());
            if server.data_dir.is_dir() {
                stop_recorded_server(&server.data_dir)?;
            }
            return Ok(ExitCode::SUCCESS);
        }
        warn!(
            "Shutdown command for {} failed, falling back to the lock file",
            server.address()
        );
    }

    stop_from_lock(&server.data_dir)
}

/// Server config from the file, with `--port` and `--data-dir` applied.
pub fn server_config(config: &LifecycleConfig, args: &StopArgs) -> Result<ServerConfig, H2ctlError> {
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

/// Stop the server recorded in the data directory's lock file.
///
/// Succeeds when there is nothing to stop.
fn stop_from_lock(data_dir: &Path) -> Result<ExitCode, H2ctlError> {
    if !data_dir.is_dir() {
        return Err(ConfigError::DirectoryNotFound {
            location: ErrorLocation::from(Location::caller()),
            reason: format!("{} is not a directory", data_dir.display()),
        }
        .into());
    }

    match stop_recorded_server(data_dir)? {
        Some(record) => info!(
            "Stopped server on {}:{} started at {}",
            record.host, record.port, record.started_at
        ),
        None => info!("No server recorded in {}", data_dir.display()),
    }

    Ok(ExitCode::SUCCESS)
}
