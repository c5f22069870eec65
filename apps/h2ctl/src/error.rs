use common::ErrorLocation;

use lifecycle_core::error::{ConfigError, CoreError, LifecycleError};

use thiserror::Error;

/// Errors that end an `h2ctl` invocation.
#[derive(Debug, Error)]
pub enum H2ctlError {
    /// Error from this app (logger, signals, output)
    #[error("H2ctl Error: {message} {location}")]
    H2ctl {
        message: String,
        location: ErrorLocation,
    },

    /// The command wrapped by `h2ctl run` could not be executed
    #[error("Command Error: {message} {location}")]
    Command {
        message: String,
        location: ErrorLocation,
    },

    /// Error from lifecycle-core (config, start, readiness, stop)
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<ConfigError> for H2ctlError {
    fn from(error: ConfigError) -> Self {
        H2ctlError::Core(CoreError::Config(error))
    }
}

impl From<LifecycleError> for H2ctlError {
    fn from(error: LifecycleError) -> Self {
        H2ctlError::Core(CoreError::Lifecycle(error))
    }
}
