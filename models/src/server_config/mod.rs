pub mod builder;

use crate::{ErrorLocation, ModelError};

use common::RedactedPassword;

use std::fmt::{Display, Formatter, Result as FormatResult};
use std::panic::Location;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default host the server binds to.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default H2 TCP port.
pub const DEFAULT_TCP_PORT: u16 = 9092;
/// Default H2 web console port.
pub const DEFAULT_WEB_PORT: u16 = 8082;
/// Default H2 TCP password, used for remote shutdown.
pub const DEFAULT_TCP_PASSWORD: &str = "default";

/// Where the database keeps its data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Databases live only for the lifetime of the server process.
    InMemory,
    /// Databases are files under the data directory.
    #[default]
    File,
}

impl Display for StorageMode {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FormatResult {
        match self {
            StorageMode::InMemory => write!(formatter, "inmemory"),
            StorageMode::File => write!(formatter, "file"),
        }
    }
}

impl FromStr for StorageMode {
    type Err = ModelError;

    #[track_caller]
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inmemory" | "in-memory" | "memory" | "mem" => Ok(StorageMode::InMemory),
            "file" | "disk" => Ok(StorageMode::File),
            other => Err(ModelError::UnknownStorageMode {
                value: other.to_string(),
                location: ErrorLocation::from(Location::caller()),
            }),
        }
    }
}

/// User and password handed to the database server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: RedactedPassword,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: RedactedPassword::new(password),
        }
    }
}

/// Everything needed to start one database server.
///
/// Build through [`ServerConfigBuilder`](crate::ServerConfigBuilder) so the
/// invariants below hold before a start is ever attempted:
/// - `host` is non-empty
/// - `port` is in 1..=65535
/// - `data_dir` is non-empty
/// - `web_port`, when set, is non-zero and differs from `port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub credentials: Option<Credentials>,
    pub mode: StorageMode,
    pub web_port: Option<u16>,
}

impl ServerConfig {
    /// Check the invariants again, for configs assembled by hand.
    #[track_caller]
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.host.trim().is_empty() {
            return Err(ModelError::Validation {
                message: String::from("Host cannot be empty"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if self.port == 0 {
            return Err(ModelError::Validation {
                message: String::from("Port must be in range 1-65535"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err(ModelError::Validation {
                message: String::from("Data directory cannot be empty"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        if let Some(web_port) = self.web_port {
            if web_port == 0 {
                return Err(ModelError::Validation {
                    message: String::from("Web port must be in range 1-65535"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }

            if web_port == self.port {
                return Err(ModelError::Validation {
                    message: format!("Web port {web_port} collides with TCP port"),
                    location: ErrorLocation::from(Location::caller()),
                });
            }
        }

        if let Some(ref credentials) = self.credentials
            && credentials.user.trim().is_empty()
        {
            return Err(ModelError::Validation {
                message: String::from("Credential user cannot be empty"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        Ok(())
    }

    /// TCP password for the server, falling back to the H2 default.
    pub fn tcp_password(&self) -> &str {
        self.credentials
            .as_ref()
            .map(|c| c.password.expose())
            .unwrap_or(DEFAULT_TCP_PASSWORD)
    }

    /// `host:port` as a socket address string.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
