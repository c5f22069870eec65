use crate::cli::CheckArgs;
use crate::error::H2ctlError;

use lifecycle_core::config::LifecycleConfig;
use lifecycle_core::port::wait_for_listener;

use std::process::ExitCode;

use log::info;

/// Wait for a server to accept connections; fail on timeout.
pub async fn execute(config: &LifecycleConfig, args: &CheckArgs) -> Result<ExitCode, H2ctlError> {
    let host = args.host.as_deref().unwrap_or(&config.server.host);
    let port = args.port.unwrap_or(config.server.tcp_port);
    let timeout = match args.timeout {
        Some(timeout) => timeout,
        None => config.ready_timeout()?,
    };

    let elapsed = wait_for_listener(host, port, timeout).await?;

    info!("{host}:{port} accepted a connection after {elapsed:?}");
    Ok(ExitCode::SUCCESS)
}
