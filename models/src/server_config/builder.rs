use crate::error::model_error::ModelError;
use crate::server_config::DEFAULT_HOST;
use crate::{Credentials, ErrorLocation, ServerConfig, StorageMode};

use std::panic::Location;
use std::path::PathBuf;

/// Builder for creating validated ServerConfig instances.
///
/// Port and data directory are required. Host defaults to
/// [`DEFAULT_HOST`], mode to [`StorageMode::File`].
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    host: Option<String>,
    port: Option<u16>,
    data_dir: Option<PathBuf>,
    credentials: Option<Credentials>,
    mode: Option<StorageMode>,
    web_port: Option<u16>,
}

impl ServerConfigBuilder {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(user, password));
        self
    }

    pub fn with_mode(mut self, mode: StorageMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_web_port(mut self, web_port: u16) -> Self {
        self.web_port = Some(web_port);
        self
    }

    /// Build the ServerConfig with validation.
    #[track_caller]
    pub fn build(self) -> Result<ServerConfig, ModelError> {
        let port = self.port.ok_or_else(|| ModelError::Validation {
            message: String::from("Port is required"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let data_dir = self.data_dir.ok_or_else(|| ModelError::Validation {
            message: String::from("Data directory is required"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let config = ServerConfig {
            host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            data_dir,
            credentials: self.credentials,
            mode: self.mode.unwrap_or_default(),
            web_port: self.web_port,
        };

        config.validate()?;

        Ok(config)
    }
}
