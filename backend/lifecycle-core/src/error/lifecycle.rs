use common::ErrorLocation;
use models::ModelError;

use std::error::Error as StdError;
use std::io::Error as IoError;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error as ThisError;

/// Errors surfaced to the build task that asked for a start, stop or wait.
///
/// Each variant carries enough detail (port, path, elapsed time) to diagnose
/// the failure without retrying. The manager never retries on its own.
#[derive(Debug, ThisError)]
pub enum LifecycleError {
    #[error("Port Unavailable Error: {host}:{port} cannot be bound: {reason} {location}")]
    PortUnavailable {
        host: String,
        port: u16,
        reason: String,
        location: ErrorLocation,
    },

    #[error("Invalid Path Error: {}: {reason} {location}", .path.display())]
    InvalidPath {
        path: PathBuf,
        reason: String,
        location: ErrorLocation,
    },

    #[error("Readiness Timeout Error: {host}:{port} did not accept connections within {elapsed:?} {location}")]
    ReadinessTimeout {
        host: String,
        port: u16,
        elapsed: Duration,
        location: ErrorLocation,
    },

    #[error("Process Exited Error: server (PID {pid}) exited with {status}; stderr: {stderr_tail} {location}")]
    ProcessExited {
        pid: u32,
        status: String,
        stderr_tail: String,
        location: ErrorLocation,
    },

    #[error("Config Conflict Error: a server with a different configuration already runs on port {port} {location}")]
    ConfigConflict { port: u16, location: ErrorLocation },

    #[error("Unknown Handle Error: {message} {location}")]
    UnknownHandle {
        message: String,
        location: ErrorLocation,
    },

    #[error("Spawn Error: {message} {location}")]
    Spawn {
        message: String,
        location: ErrorLocation,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Stop Error: {message} {location}")]
    Stop {
        message: String,
        location: ErrorLocation,
    },

    #[error("Lock Held Error: {} is held by live PID {pid} {location}", .path.display())]
    LockHeld {
        path: PathBuf,
        pid: u32,
        location: ErrorLocation,
    },

    #[error("Lock Error: {}: {source} {location}", .path.display())]
    Lock {
        path: PathBuf,
        location: ErrorLocation,
        #[source]
        source: IoError,
    },

    #[error(transparent)]
    Model(#[from] ModelError),
}
