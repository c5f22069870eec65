use crate::error::H2ctlError;

use common::ErrorLocation;
use lifecycle_core::config::LifecycleConfig;

use std::panic::Location;
use std::process::ExitCode;

/// Render the effective configuration as TOML, passwords omitted.
///
/// The resolved data directory is always written out, with a comment
/// saying where it came from.
pub fn render(config: &LifecycleConfig) -> Result<String, H2ctlError> {
    let (data_dir, source) = config.data_dir_with_source();

    let mut effective = config.clone();
    effective.server.data_dir = Some(data_dir);

    let body = toml::to_string_pretty(&effective).map_err(|e| H2ctlError::H2ctl {
        message: format!("Failed to render configuration: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    Ok(format!("# data_dir: {source}\n{body}"))
}

pub fn execute(config: &LifecycleConfig) -> Result<ExitCode, H2ctlError> {
    println!("{}", render(config)?);
    Ok(ExitCode::SUCCESS)
}
