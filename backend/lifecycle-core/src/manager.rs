//! The lifecycle manager: start, wait for readiness, stop.
//!
//! A [`LifecycleManager`] owns every server it starts. Callers only ever
//! hold a [`ServerHandle`], an opaque ticket that stops being valid once the
//! server is stopped. Start and stop are idempotent; nothing is retried
//! automatically.
//!
//! Cleanup is guaranteed on drop: children are spawned with
//! `kill_on_drop`, and lock files are removed by their guards.

use crate::error::LifecycleError;
use crate::launcher::{LaunchCommand, ServerLauncher, request_shutdown};
use crate::lock::{LockRecord, ServerLock};
use crate::output::OutputMonitor;
use crate::port::{accepts_connections, ensure_available, wait_until_free};
use crate::process::terminate;

use common::ErrorLocation;
use models::{ServerConfig, ServerInfo};

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::panic::Location;
use std::path::Path;
use std::process::ExitStatus;
use std::time::{Duration, Instant};

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, info, trace, warn};
use tokio::process::Child as TokioChild;
use tokio::time::{sleep as TokioSleep, timeout as TokioTimeout};
use uuid::Uuid;

const READY_INITIAL_INTERVAL: Duration = Duration::from_millis(50);
const READY_MAX_INTERVAL: Duration = Duration::from_secs(1);
const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_millis(500);
const OUTPUT_DRAIN_DELAY: Duration = Duration::from_millis(100);
const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);
const DEFAULT_PORT_RELEASE_GRACE: Duration = Duration::from_secs(5);
const WRITE_CHECK_PREFIX: &str = ".h2-lifecycle-write-check-";

/// Opaque reference to a server owned by a [`LifecycleManager`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerHandle {
    id: Uuid,
    port: u16,
}

impl ServerHandle {
    fn new(port: u16) -> Self {
        Self {
            id: Uuid::new_v4(),
            port,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "server {} on port {}", self.id, self.port)
    }
}

/// Timing knobs for stopping servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerOptions {
    /// How long a server gets to exit after each shutdown request.
    pub stop_grace: Duration,
    /// How long to wait for the port to become bindable after stop.
    pub port_release_grace: Duration,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            stop_grace: DEFAULT_STOP_GRACE,
            port_release_grace: DEFAULT_PORT_RELEASE_GRACE,
        }
    }
}

struct ManagedServer {
    handle: ServerHandle,
    config: ServerConfig,
    child: TokioChild,
    pid: u32,
    command_line: String,
    output: OutputMonitor,
    lock: ServerLock,
    ready: bool,
}

impl ManagedServer {
    fn exit_status(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!("Could not poll PID {}: {e}", self.pid);
                None
            }
        }
    }

    fn info(&self) -> ServerInfo {
        ServerInfo {
            pid: self.pid,
            host: self.config.host.clone(),
            port: self.config.port,
            web_port: self.config.web_port,
            data_dir: self.config.data_dir.clone(),
            mode: self.config.mode,
            command: self.command_line.clone(),
            announced_url: self.output.announced_url(),
            ready: self.ready,
        }
    }
}

enum Existing {
    Alive(ServerHandle),
    Conflict,
    Exited,
    Absent,
}

/// Starts, probes and stops database servers through a [`ServerLauncher`].
pub struct LifecycleManager<L: ServerLauncher> {
    launcher: L,
    options: ManagerOptions,
    servers: HashMap<u16, ManagedServer>,
}

impl<L: ServerLauncher> LifecycleManager<L> {
    pub fn new(launcher: L) -> Self {
        Self::with_options(launcher, ManagerOptions::default())
    }

    pub fn with_options(launcher: L, options: ManagerOptions) -> Self {
        Self {
            launcher,
            options,
            servers: HashMap::new(),
        }
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn options(&self) -> ManagerOptions {
        self.options
    }

    /// Start a server for `config`.
    ///
    /// Returns the existing handle if this manager already runs a live server
    /// with an identical config on the same port.
    ///
    /// # Errors
    ///
    /// * `PortUnavailable` - TCP or web port is already bound
    /// * `InvalidPath` - data directory cannot be created or written
    /// * `ConfigConflict` - a different config already runs on this port
    /// * `LockHeld` - another live process claims the data directory
    /// * `Spawn` - the launcher's program could not be executed
    pub async fn start(&mut self, config: ServerConfig) -> Result<ServerHandle, LifecycleError> {
        config.validate()?;

        match self.existing(&config) {
            Existing::Alive(handle) => {
                info!("Server already running for port {}, reusing {handle}", config.port);
                return Ok(handle);
            }
            Existing::Conflict => {
                return Err(LifecycleError::ConfigConflict {
                    port: config.port,
                    location: ErrorLocation::from(Location::caller()),
                });
            }
            Existing::Exited => {
                if let Some(mut stale) = self.servers.remove(&config.port) {
                    warn!(
                        "Server PID {} on port {} exited on its own, starting a new one",
                        stale.pid, config.port
                    );
                    stale.lock.release();
                }
            }
            Existing::Absent => {}
        }

        prepare_data_dir(&config.data_dir)?;
        ensure_available(&config.host, config.port)?;
        if let Some(web_port) = config.web_port {
            ensure_available(&config.host, web_port)?;
        }

        let mut lock = ServerLock::acquire(
            &config.data_dir,
            LockRecord::new(config.host.clone(), config.port),
        )?;

        let launch = self.launcher.command(&config)?;
        let mut child = spawn(&launch)?;

        let Some(pid) = child.id() else {
            let status = child
                .wait()
                .await
                .map(|s| s.to_string())
                .unwrap_or_else(|e| e.to_string());
            return Err(LifecycleError::ProcessExited {
                pid: 0,
                status,
                stderr_tail: String::new(),
                location: ErrorLocation::from(Location::caller()),
            });
        };

        lock.set_server_pid(pid)?;

        let label = format!("{}:{}", self.launcher.name(), config.port);
        let output = OutputMonitor::attach(&mut child, label);
        let handle = ServerHandle::new(config.port);

        info!(
            "Started {} (PID {pid}) for {} in {} mode",
            self.launcher.name(),
            config.address(),
            config.mode
        );

        self.servers.insert(
            config.port,
            ManagedServer {
                handle: handle.clone(),
                config,
                child,
                pid,
                command_line: launch.display(),
                output,
                lock,
                ready: false,
            },
        );

        Ok(handle)
    }

    fn existing(&mut self, config: &ServerConfig) -> Existing {
        let Some(server) = self.servers.get_mut(&config.port) else {
            return Existing::Absent;
        };

        if server.exit_status().is_some() {
            Existing::Exited
        } else if server.config == *config {
            Existing::Alive(server.handle.clone())
        } else {
            Existing::Conflict
        }
    }

    fn lookup_mut(&mut self, handle: &ServerHandle) -> Option<&mut ManagedServer> {
        self.servers
            .get_mut(&handle.port)
            .filter(|server| server.handle == *handle)
    }

    /// Poll until the server accepts TCP connections or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// * `ReadinessTimeout` - no connection succeeded within `timeout`
    /// * `ProcessExited` - the server process died while waiting
    /// * `UnknownHandle` - the handle was stopped or never belonged here
    pub async fn wait_until_ready(
        &mut self,
        handle: &ServerHandle,
        timeout: Duration,
    ) -> Result<(), LifecycleError> {
        let location = ErrorLocation::from(Location::caller());

        let Some(server) = self.lookup_mut(handle) else {
            return Err(LifecycleError::UnknownHandle {
                message: format!("{handle} is not running under this manager"),
                location,
            });
        };

        if server.ready {
            return Ok(());
        }

        let host = server.config.host.clone();
        let port = server.config.port;
        let started = Instant::now();
        let mut backoff = ExponentialBackoff {
            current_interval: READY_INITIAL_INTERVAL,
            initial_interval: READY_INITIAL_INTERVAL,
            max_interval: READY_MAX_INTERVAL,
            max_elapsed_time: None,
            ..Default::default()
        };

        debug!("Waiting up to {timeout:?} for {host}:{port} to accept connections");

        loop {
            if let Some(status) = server.exit_status() {
                TokioSleep(OUTPUT_DRAIN_DELAY).await;
                return Err(LifecycleError::ProcessExited {
                    pid: server.pid,
                    status: status.to_string(),
                    stderr_tail: server.output.stderr_tail(),
                    location,
                });
            }

            let attempt = CONNECT_ATTEMPT_TIMEOUT.min(timeout.saturating_sub(started.elapsed()));
            if accepts_connections(&host, port, attempt.max(Duration::from_millis(1))).await {
                server.ready = true;
                info!(
                    "Server on {host}:{port} ready after {:?}",
                    started.elapsed()
                );
                return Ok(());
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                warn!("Server on {host}:{port} not ready after {elapsed:?}");
                return Err(LifecycleError::ReadinessTimeout {
                    host,
                    port,
                    elapsed,
                    location,
                });
            }

            let remaining = timeout - elapsed;
            let delay = backoff
                .next_backoff()
                .unwrap_or(READY_MAX_INTERVAL)
                .min(remaining);
            trace!("Server not ready, retrying after {delay:?}");
            TokioSleep(delay).await;
        }
    }

    /// Stop the server behind `handle` and release its port and lock file.
    ///
    /// Stopping a handle that is already stopped, or that this manager never
    /// issued, is a no-op.
    pub async fn stop(&mut self, handle: &ServerHandle) -> Result<(), LifecycleError> {
        let location = ErrorLocation::from(Location::caller());

        if self.lookup_mut(handle).is_none() {
            debug!("{handle} already stopped");
            return Ok(());
        }

        match self.servers.remove(&handle.port) {
            Some(server) => self.shutdown(server, location).await,
            None => Ok(()),
        }
    }

    /// Stop every server this manager owns.
    ///
    /// Keeps going after a failure and returns the first error seen.
    pub async fn stop_all(&mut self) -> Result<(), LifecycleError> {
        let location = ErrorLocation::from(Location::caller());
        let mut first_error = None;

        let servers: Vec<ManagedServer> = self.servers.drain().map(|(_, s)| s).collect();
        for server in servers {
            if let Err(e) = self.shutdown(server, location).await {
                warn!("Failed to stop server: {e}");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn shutdown(
        &self,
        mut server: ManagedServer,
        location: ErrorLocation,
    ) -> Result<(), LifecycleError> {
        let pid = server.pid;
        let grace = self.options.stop_grace;

        info!("Stopping server PID {pid} on port {}", server.config.port);

        if server.exit_status().is_none() {
            if let Some(shutdown) = self.launcher.shutdown_command(&server.config) {
                request_shutdown(&shutdown, grace).await;
            } else if !terminate(pid) {
                debug!("SIGTERM not delivered to PID {pid}");
            }

            let exited = matches!(
                TokioTimeout(grace, server.child.wait()).await,
                Ok(Ok(_))
            );

            if !exited {
                warn!("Server PID {pid} still running after {grace:?}, killing");
                if let Err(e) = server.child.kill().await {
                    server.lock.release();
                    return Err(LifecycleError::Stop {
                        message: format!("Failed to kill server PID {pid}: {e}"),
                        location,
                    });
                }
            }
        }

        server.lock.release();

        let release = self.options.port_release_grace;
        let ports = [Some(server.config.port), server.config.web_port];
        for port in ports.into_iter().flatten() {
            if !wait_until_free(&server.config.host, port, release).await {
                warn!("Port {port} still bound {release:?} after stopping PID {pid}");
            }
        }

        info!("Server PID {pid} stopped");
        Ok(())
    }

    /// Snapshot of a running server, or `None` for unknown/stopped handles.
    pub fn info(&self, handle: &ServerHandle) -> Option<ServerInfo> {
        self.servers
            .get(&handle.port)
            .filter(|server| server.handle == *handle)
            .map(ManagedServer::info)
    }

    /// Whether the server behind `handle` is owned here and still alive.
    pub fn is_running(&mut self, handle: &ServerHandle) -> bool {
        self.lookup_mut(handle)
            .map(|server| server.exit_status().is_none())
            .unwrap_or(false)
    }

    pub fn running_handles(&self) -> Vec<ServerHandle> {
        self.servers.values().map(|s| s.handle.clone()).collect()
    }
}

impl<L: ServerLauncher> Drop for LifecycleManager<L> {
    fn drop(&mut self) {
        for (port, server) in self.servers.iter_mut() {
            warn!(
                "Manager dropped with server PID {} on port {port} still running, killing it",
                server.pid
            );
            if let Err(e) = server.child.start_kill() {
                debug!("Kill of PID {} failed: {e}", server.pid);
            }
            server.lock.release();
        }
    }
}

/// Create the data directory and prove it can be written to.
#[track_caller]
fn prepare_data_dir(path: &Path) -> Result<(), LifecycleError> {
    let location = ErrorLocation::from(Location::caller());
    let invalid = |reason: String| LifecycleError::InvalidPath {
        path: path.to_path_buf(),
        reason,
        location,
    };

    fs::create_dir_all(path).map_err(|e| invalid(format!("cannot create directory: {e}")))?;

    let metadata = fs::metadata(path).map_err(|e| invalid(format!("cannot access directory: {e}")))?;

    if !metadata.is_dir() {
        return Err(invalid(String::from("not a directory")));
    }

    // Write bits alone miss ACLs, read-only mounts and pseudo filesystems.
    let check_file = path.join(format!("{WRITE_CHECK_PREFIX}{}", std::process::id()));
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&check_file)
        .map_err(|e| invalid(format!("directory is not writable: {e}")))?;

    if let Err(e) = fs::remove_file(&check_file) {
        warn!("Could not remove write check file {}: {e}", check_file.display());
    }

    Ok(())
}

#[track_caller]
fn spawn(launch: &LaunchCommand) -> Result<TokioChild, LifecycleError> {
    let location = ErrorLocation::from(Location::caller());
    debug!("Spawning {}", launch.display());

    launch.to_command().spawn().map_err(|e| LifecycleError::Spawn {
        message: format!(
            "Failed to spawn {}: {e}",
            launch.program().to_string_lossy()
        ),
        location,
        source: Box::new(e),
    })
}
