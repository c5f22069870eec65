//! How a database server process is started and asked to shut down.
//!
//! [`LifecycleManager`](crate::LifecycleManager) is generic over
//! [`ServerLauncher`], so the same lifecycle drives a real H2 server or any
//! other program that listens on a TCP port.

use crate::error::LifecycleError;
use crate::port::{is_loopback_host, probe_host};
use crate::{DEFAULT_JAVA, H2_LOCAL_TCP_URL, H2_MAIN_CLASS, H2_TCP_URL_SCHEME, LOOPBACK_HOST};

use common::ErrorLocation;
use models::{ServerConfig, StorageMode};

use std::ffi::OsString;
use std::panic::Location;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use tokio::process::Command as TokioCommand;
use tokio::time::timeout as TokioTimeout;

const REDACTED_ARG: &str = "********";
const PLACEHOLDER_HOST: &str = "{host}";
const PLACEHOLDER_PORT: &str = "{port}";
const PLACEHOLDER_WEB_PORT: &str = "{web_port}";
const PLACEHOLDER_DATA_DIR: &str = "{data_dir}";
const PLACEHOLDER_USER: &str = "{user}";
const PLACEHOLDER_PASSWORD: &str = "{password}";

/// A program plus arguments, with some arguments marked secret.
///
/// Secret arguments are passed to the process but replaced by asterisks in
/// [`display`](Self::display), which is what gets logged and reported.
#[derive(Clone)]
pub struct LaunchCommand {
    program: OsString,
    args: Vec<String>,
    secrets: Vec<usize>,
}

impl LaunchCommand {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            secrets: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.secrets.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    pub fn program(&self) -> &OsString {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Command line safe for logs.
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().to_string()];
        parts.extend(self.args.iter().enumerate().map(|(i, arg)| {
            if self.secrets.contains(&i) {
                REDACTED_ARG.to_string()
            } else {
                arg.clone()
            }
        }));
        parts.join(" ")
    }

    /// Build the tokio command: piped output, no stdin, killed if dropped.
    pub fn to_command(&self) -> TokioCommand {
        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

/// Run a launcher's shutdown command to completion, for at most `grace`.
///
/// # Returns
///
/// * `true` - If the command ran and exited successfully
/// * `false` - If it could not run, failed, or timed out
pub async fn request_shutdown(shutdown: &LaunchCommand, grace: Duration) -> bool {
    debug!("Running shutdown command {}", shutdown.display());

    let mut cmd = shutdown.to_command();
    match TokioTimeout(grace, cmd.output()).await {
        Ok(Ok(output)) if output.status.success() => {
            debug!("Shutdown command succeeded");
            true
        }
        Ok(Ok(output)) => {
            warn!(
                "Shutdown command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
            false
        }
        Ok(Err(e)) => {
            warn!("Shutdown command failed to run: {e}");
            false
        }
        Err(_) => {
            warn!("Shutdown command did not finish within {grace:?}");
            false
        }
    }
}

impl std::fmt::Debug for LaunchCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LaunchCommand({})", self.display())
    }
}

pub trait ServerLauncher {
    /// Short name used in log prefixes.
    fn name(&self) -> &str;

    /// Command that starts a server for `config` in the foreground.
    fn command(&self, config: &ServerConfig) -> Result<LaunchCommand, LifecycleError>;

    /// Command that asks a running server to shut down, if the server has one.
    ///
    /// When `None`, the manager signals the process directly.
    fn shutdown_command(&self, _config: &ServerConfig) -> Option<LaunchCommand> {
        None
    }
}

/// Runs `org.h2.tools.Server` from an H2 jar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct H2Launcher {
    #[serde(default = "default_java")]
    pub java: PathBuf,
    pub classpath: PathBuf,
}

fn default_java() -> PathBuf {
    PathBuf::from(DEFAULT_JAVA)
}

impl H2Launcher {
    pub fn new(classpath: impl Into<PathBuf>) -> Self {
        Self {
            java: default_java(),
            classpath: classpath.into(),
        }
    }

    fn base_command(&self) -> LaunchCommand {
        LaunchCommand::new(self.java.as_os_str())
            .arg("-cp")
            .arg(self.classpath.to_string_lossy())
            .arg(H2_MAIN_CLASS)
    }

    fn tcp_url(config: &ServerConfig) -> String {
        let host = probe_host(&config.host);
        if is_loopback_host(&config.host) || host == LOOPBACK_HOST {
            format!("{H2_LOCAL_TCP_URL}:{}", config.port)
        } else {
            format!("{H2_TCP_URL_SCHEME}{host}:{}", config.port)
        }
    }
}

impl ServerLauncher for H2Launcher {
    fn name(&self) -> &str {
        "h2"
    }

    #[track_caller]
    fn command(&self, config: &ServerConfig) -> Result<LaunchCommand, LifecycleError> {
        if !self.classpath.exists() {
            return Err(LifecycleError::InvalidPath {
                path: self.classpath.clone(),
                reason: String::from("H2 classpath entry does not exist"),
                location: ErrorLocation::from(Location::caller()),
            });
        }

        let mut cmd = self
            .base_command()
            .arg("-tcp")
            .arg("-tcpPort")
            .arg(config.port.to_string())
            .arg("-tcpPassword")
            .secret_arg(config.tcp_password())
            .arg("-ifNotExists");

        if !is_loopback_host(&config.host) {
            cmd = cmd.arg("-tcpAllowOthers");
        }

        if config.mode == StorageMode::File {
            cmd = cmd
                .arg("-baseDir")
                .arg(config.data_dir.to_string_lossy());
        }

        if let Some(web_port) = config.web_port {
            cmd = cmd.arg("-web").arg("-webPort").arg(web_port.to_string());
        }

        Ok(cmd)
    }

    fn shutdown_command(&self, config: &ServerConfig) -> Option<LaunchCommand> {
        Some(
            self.base_command()
                .arg("-tcpShutdown")
                .arg(Self::tcp_url(config))
                .arg("-tcpPassword")
                .secret_arg(config.tcp_password()),
        )
    }
}

/// Runs an arbitrary program.
///
/// Arguments may contain `{host}`, `{port}`, `{web_port}`, `{data_dir}`,
/// `{user}` and `{password}`; arguments containing `{password}` are redacted
/// in logs. `{user}` is empty when no credentials are configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandLauncher {
    pub program: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandLauncher {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

fn expand_placeholders(template: &str, config: &ServerConfig) -> String {
    template
        .replace(PLACEHOLDER_HOST, &config.host)
        .replace(PLACEHOLDER_WEB_PORT, &config.web_port.map(|p| p.to_string()).unwrap_or_default())
        .replace(PLACEHOLDER_PORT, &config.port.to_string())
        .replace(PLACEHOLDER_DATA_DIR, &config.data_dir.to_string_lossy())
        .replace(
            PLACEHOLDER_USER,
            config.credentials.as_ref().map(|c| c.user.as_str()).unwrap_or_default(),
        )
        .replace(PLACEHOLDER_PASSWORD, config.tcp_password())
}

impl ServerLauncher for CommandLauncher {
    fn name(&self) -> &str {
        self.program
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("server")
    }

    fn command(&self, config: &ServerConfig) -> Result<LaunchCommand, LifecycleError> {
        let cmd = self
            .args
            .iter()
            .fold(LaunchCommand::new(self.program.as_os_str()), |cmd, template| {
                let expanded = expand_placeholders(template, config);
                if template.contains(PLACEHOLDER_PASSWORD) {
                    cmd.secret_arg(expanded)
                } else {
                    cmd.arg(expanded)
                }
            });

        Ok(cmd)
    }
}

/// Launcher chosen by a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ConfiguredLauncher {
    H2(H2Launcher),
    Command(CommandLauncher),
}

impl ServerLauncher for ConfiguredLauncher {
    fn name(&self) -> &str {
        match self {
            ConfiguredLauncher::H2(launcher) => launcher.name(),
            ConfiguredLauncher::Command(launcher) => launcher.name(),
        }
    }

    fn command(&self, config: &ServerConfig) -> Result<LaunchCommand, LifecycleError> {
        match self {
            ConfiguredLauncher::H2(launcher) => launcher.command(config),
            ConfiguredLauncher::Command(launcher) => launcher.command(config),
        }
    }

    fn shutdown_command(&self, config: &ServerConfig) -> Option<LaunchCommand> {
        match self {
            ConfiguredLauncher::H2(launcher) => launcher.shutdown_command(config),
            ConfiguredLauncher::Command(launcher) => launcher.shutdown_command(config),
        }
    }
}
