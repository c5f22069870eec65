pub mod paths;

use paths::PathSource;

use crate::error::config::ConfigError;
use crate::launcher::{ConfiguredLauncher, H2Launcher};
use crate::manager::ManagerOptions;

use common::{ErrorLocation, RedactedPassword};
use models::server_config::{DEFAULT_HOST, DEFAULT_TCP_PASSWORD, DEFAULT_TCP_PORT, DEFAULT_WEB_PORT};
use models::{Credentials, ServerConfig, ServerConfigBuilder, StorageMode};

use std::env;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use humantime::parse_duration;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "h2.toml";
const CONFIG_VERSION: u32 = 1;
const DEFAULT_H2_JAR: &str = "h2.jar";

pub const ENV_HOST: &str = "H2_HOST";
pub const ENV_TCP_PORT: &str = "H2_TCP_PORT";
pub const ENV_WEB_PORT: &str = "H2_WEB_PORT";
pub const ENV_DATA_DIR: &str = "H2_DATA_DIR";
pub const ENV_MODE: &str = "H2_MODE";
pub const ENV_USER: &str = "H2_USER";
pub const ENV_PASSWORD: &str = "H2_PASSWORD";
pub const ENV_READY_TIMEOUT: &str = "H2_READY_TIMEOUT";

// ============================================
// CONFIG STRUCTS
// ============================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    #[serde(default = "default_web_port")]
    pub web_port: u16,
    /// Start H2's web console on `web_port`.
    #[serde(default = "default_web_console")]
    pub web_console: bool,
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub mode: StorageMode,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default, skip_serializing)]
    pub password: Option<RedactedPassword>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            tcp_port: default_tcp_port(),
            web_port: default_web_port(),
            web_console: default_web_console(),
            data_dir: None,
            mode: StorageMode::default(),
            user: None,
            password: None,
        }
    }
}

/// Durations in humantime notation (`"20s"`, `"500ms"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSection {
    #[serde(default = "default_ready_timeout")]
    pub ready: String,
    #[serde(default = "default_stop_grace")]
    pub stop_grace: String,
    #[serde(default = "default_port_release")]
    pub port_release: String,
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            ready: default_ready_timeout(),
            stop_grace: default_stop_grace(),
            port_release: default_port_release(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub server: ServerSection,

    #[serde(default = "default_launcher")]
    pub launcher: ConfiguredLauncher,

    #[serde(default)]
    pub timeouts: TimeoutSection,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            server: ServerSection::default(),
            launcher: default_launcher(),
            timeouts: TimeoutSection::default(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_host() -> String {
    DEFAULT_HOST.to_string()
}
fn default_tcp_port() -> u16 {
    DEFAULT_TCP_PORT
}
fn default_web_port() -> u16 {
    DEFAULT_WEB_PORT
}
fn default_web_console() -> bool {
    true
}
fn default_launcher() -> ConfiguredLauncher {
    ConfiguredLauncher::H2(H2Launcher::new(DEFAULT_H2_JAR))
}
fn default_ready_timeout() -> String {
    "20s".to_string()
}
fn default_stop_grace() -> String {
    "5s".to_string()
}
fn default_port_release() -> String {
    "5s".to_string()
}

// ============================================
// IMPLEMENTATION
// ============================================

impl LifecycleConfig {
    /// Load config from a TOML file.
    ///
    /// # Returns
    ///
    /// Returns `Ok(LifecycleConfig)` if loaded successfully or defaults if the file is missing.
    /// Returns `Err(ConfigError)` if the file exists but is unreadable or invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("Config file not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            location: ErrorLocation::from(Location::caller()),
            path: path.to_path_buf(),
            source: e,
        })?;

        let config = Self::from_toml_str(&contents, path)?;

        info!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Parse and validate TOML contents; `origin` is only used in errors.
    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: LifecycleConfig =
            toml::from_str(contents).map_err(|e| ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: origin.to_path_buf(),
                reason: e.to_string(),
            })?;

        config.validate()?;

        Ok(config)
    }

    /// Load `.env` (if any) and apply `H2_*` environment overrides.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        try_load_dotenv();
        self.apply_overrides(|name| env::var(name).ok())
    }

    /// Apply overrides from any variable source, then re-validate.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(ENV_HOST) {
            debug!("{ENV_HOST} overrides host");
            self.server.host = host;
        }

        if let Some(port) = lookup(ENV_TCP_PORT) {
            debug!("{ENV_TCP_PORT} overrides TCP port");
            self.server.tcp_port = parse_port(ENV_TCP_PORT, &port)?;
        }

        if let Some(port) = lookup(ENV_WEB_PORT) {
            if port.trim().is_empty() {
                debug!("Empty {ENV_WEB_PORT} disables the web console");
                self.server.web_console = false;
            } else {
                debug!("{ENV_WEB_PORT} overrides web port");
                self.server.web_port = parse_port(ENV_WEB_PORT, &port)?;
                self.server.web_console = true;
            }
        }

        if let Some(dir) = lookup(ENV_DATA_DIR) {
            debug!("{ENV_DATA_DIR} overrides data directory");
            self.server.data_dir = Some(PathBuf::from(dir));
        }

        if let Some(mode) = lookup(ENV_MODE) {
            debug!("{ENV_MODE} overrides storage mode");
            self.server.mode = mode.parse().map_err(|e| ConfigError::OverrideError {
                location: ErrorLocation::from(Location::caller()),
                variable: ENV_MODE.to_string(),
                reason: format!("{e}"),
            })?;
        }

        if let Some(user) = lookup(ENV_USER) {
            debug!("{ENV_USER} overrides user");
            self.server.user = Some(user);
        }

        if let Some(password) = lookup(ENV_PASSWORD) {
            debug!("{ENV_PASSWORD} overrides password");
            self.server.password = Some(RedactedPassword::new(password));
        }

        if let Some(ready) = lookup(ENV_READY_TIMEOUT) {
            debug!("{ENV_READY_TIMEOUT} overrides readiness timeout");
            self.timeouts.ready = ready;
        }

        self.validate()
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: format!(
                    "Invalid version: {} (expected 1-{})",
                    self.version, CONFIG_VERSION
                ),
            });
        }

        if self.server.password.is_some() && self.server.user.is_none() {
            return Err(ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: String::from("password is set but user is missing"),
            });
        }

        self.ready_timeout()?;
        self.stop_grace()?;
        self.port_release_grace()?;

        // Reuse the model's invariants so the file fails early, not at start.
        self.server_config_with_dir(self.data_dir())?;

        Ok(())
    }

    /// Configured data directory, or the platform default.
    pub fn data_dir(&self) -> PathBuf {
        let (dir, source) = self.data_dir_with_source();
        debug!("Using {source} data directory {}", dir.display());
        dir
    }

    pub fn data_dir_with_source(&self) -> (PathBuf, PathSource) {
        match self.server.data_dir {
            Some(ref dir) => (dir.clone(), PathSource::Configured),
            None => paths::default_data_dir(),
        }
    }

    /// Build the validated server config this file describes.
    pub fn server_config(&self) -> Result<ServerConfig, ConfigError> {
        self.server_config_with_dir(self.data_dir())
    }

    fn server_config_with_dir(&self, data_dir: PathBuf) -> Result<ServerConfig, ConfigError> {
        let mut builder = ServerConfigBuilder::default()
            .with_host(self.server.host.clone())
            .with_port(self.server.tcp_port)
            .with_data_dir(data_dir)
            .with_mode(self.server.mode);

        if self.server.web_console {
            builder = builder.with_web_port(self.server.web_port);
        }

        let mut config = builder.build().map_err(|e| ConfigError::ValidationError {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        if let Some(ref user) = self.server.user {
            config.credentials = Some(Credentials {
                user: user.clone(),
                password: self
                    .server
                    .password
                    .clone()
                    .unwrap_or_else(|| RedactedPassword::new(DEFAULT_TCP_PASSWORD)),
            });
            config.validate().map_err(|e| ConfigError::ValidationError {
                location: ErrorLocation::from(Location::caller()),
                reason: e.to_string(),
            })?;
        }

        Ok(config)
    }

    pub fn ready_timeout(&self) -> Result<Duration, ConfigError> {
        parse_duration_field("timeouts.ready", &self.timeouts.ready)
    }

    pub fn stop_grace(&self) -> Result<Duration, ConfigError> {
        parse_duration_field("timeouts.stop_grace", &self.timeouts.stop_grace)
    }

    pub fn port_release_grace(&self) -> Result<Duration, ConfigError> {
        parse_duration_field("timeouts.port_release", &self.timeouts.port_release)
    }

    pub fn manager_options(&self) -> Result<ManagerOptions, ConfigError> {
        Ok(ManagerOptions {
            stop_grace: self.stop_grace()?,
            port_release_grace: self.port_release_grace()?,
        })
    }
}

fn parse_port(variable: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .trim()
        .parse::<u16>()
        .map_err(|e| ConfigError::OverrideError {
            location: ErrorLocation::from(Location::caller()),
            variable: variable.to_string(),
            reason: format!("'{value}' is not a port: {e}"),
        })
}

fn parse_duration_field(field: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value.trim()).map_err(|e| ConfigError::ValidationError {
        location: ErrorLocation::from(Location::caller()),
        reason: format!("{field}: '{value}' is not a duration: {e}"),
    })
}

/// Attempts to load .env from the current directory.
fn try_load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => info!("Loaded .env from: {}", path.display()),
        Err(e) if e.not_found() => debug!("No .env file found"),
        Err(e) => warn!("Failed to parse .env: {e}"),
    }
}
