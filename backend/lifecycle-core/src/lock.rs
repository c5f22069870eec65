//! Lock record kept in the data directory while a server runs.
//!
//! The record keeps two managers from driving servers out of the same data
//! directory, and lets a later invocation find and stop a server it did not
//! start.

use crate::error::LifecycleError;
use crate::process::{is_alive, stop_pid};

use common::ErrorLocation;

use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use humantime::format_rfc3339;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

pub const LOCK_FILE_NAME: &str = "h2-lifecycle.lock";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Process that owns the manager.
    pub owner_pid: u32,
    /// Database server process, once spawned.
    pub server_pid: Option<u32>,
    pub host: String,
    pub port: u16,
    pub started_at: String,
}

impl LockRecord {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            owner_pid: std::process::id(),
            server_pid: None,
            host: host.into(),
            port,
            started_at: format_rfc3339(SystemTime::now()).to_string(),
        }
    }

    fn holder_pid(&self) -> Option<u32> {
        [Some(self.owner_pid), self.server_pid]
            .into_iter()
            .flatten()
            .find(|&pid| is_alive(pid))
    }
}

pub fn lock_path(data_dir: &Path) -> PathBuf {
    data_dir.join(LOCK_FILE_NAME)
}

/// Read the lock record in `data_dir`, if there is one.
#[track_caller]
pub fn read_lock(data_dir: &Path) -> Result<Option<LockRecord>, LifecycleError> {
    let location = ErrorLocation::from(Location::caller());
    let path = lock_path(data_dir);

    let contents = match fs::read_to_string(&path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(LifecycleError::Lock {
                path,
                location,
                source: e,
            });
        }
    };

    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| LifecycleError::Lock {
            path,
            location,
            source: io::Error::new(ErrorKind::InvalidData, e),
        })
}

/// Exclusive claim on a data directory, released on drop.
#[derive(Debug)]
pub struct ServerLock {
    path: PathBuf,
    record: LockRecord,
    released: bool,
}

impl ServerLock {
    /// Create the lock file, replacing it only if every PID it names is dead.
    #[track_caller]
    pub fn acquire(data_dir: &Path, record: LockRecord) -> Result<Self, LifecycleError> {
        let path = lock_path(data_dir);

        match read_lock(data_dir) {
            Ok(Some(existing)) => {
                if let Some(pid) = existing.holder_pid() {
                    return Err(LifecycleError::LockHeld {
                        path,
                        pid,
                        location: ErrorLocation::from(Location::caller()),
                    });
                }
                warn!("Removing stale lock {} (port {})", path.display(), existing.port);
                remove_lock_file(&path);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Replacing unreadable lock {}: {e}", path.display());
                remove_lock_file(&path);
            }
        }

        let lock = Self {
            path,
            record,
            released: false,
        };
        lock.write(true)?;

        debug!("Lock acquired at {}", lock.path.display());
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self) -> &LockRecord {
        &self.record
    }

    /// Record the spawned server's PID.
    #[track_caller]
    pub fn set_server_pid(&mut self, pid: u32) -> Result<(), LifecycleError> {
        self.record.server_pid = Some(pid);
        self.write(false)
    }

    #[track_caller]
    fn write(&self, create_new: bool) -> Result<(), LifecycleError> {
        let location = ErrorLocation::from(Location::caller());
        let lock_error = |source: io::Error| LifecycleError::Lock {
            path: self.path.clone(),
            location,
            source,
        };

        let mut options = OpenOptions::new();
        options.write(true);
        if create_new {
            options.create_new(true);
        } else {
            options.create(true).truncate(true);
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let json = serde_json::to_string(&self.record)
            .map_err(|e| lock_error(io::Error::new(ErrorKind::InvalidData, e)))?;

        let mut file = options.open(&self.path).map_err(lock_error)?;
        file.write_all(json.as_bytes()).map_err(lock_error)?;
        file.sync_all().map_err(lock_error)?;

        Ok(())
    }

    /// Remove the lock file. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        remove_lock_file(&self.path);
        self.released = true;
        debug!("Lock released at {}", self.path.display());
    }
}

impl Drop for ServerLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn remove_lock_file(path: &Path) {
    match fs::remove_file(path) {
        Err(error) if error.kind() != ErrorKind::NotFound => {
            warn!("Failed to remove lock file {}: {error}", path.display());
        }
        _ => {}
    }
}

/// Stop whatever server the lock in `data_dir` records, then clear the lock.
///
/// Returns the record that was found, or `None` when no lock exists.
#[track_caller]
pub fn stop_recorded_server(data_dir: &Path) -> Result<Option<LockRecord>, LifecycleError> {
    let Some(record) = read_lock(data_dir)? else {
        debug!("No lock in {}, nothing to stop", data_dir.display());
        return Ok(None);
    };

    if let Some(pid) = record.server_pid
        && is_alive(pid)
    {
        info!("Stopping recorded server PID {pid} on port {}", record.port);
        if !stop_pid(pid) {
            return Err(LifecycleError::Stop {
                message: format!("Recorded server PID {pid} did not terminate"),
                location: ErrorLocation::from(Location::caller()),
            });
        }
    } else {
        debug!("Recorded server is no longer running, clearing lock");
    }

    remove_lock_file(&lock_path(data_dir));
    Ok(Some(record))
}
