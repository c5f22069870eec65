//! Process table helpers for terminating database servers by PID.
//!
//! The manager prefers its own child handles; these helpers cover the cases
//! where only a PID is known (a lock record left by another invocation, or
//! naming whoever holds a port).

use std::thread::sleep;
use std::time::Duration;

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, trace, warn};
use sysinfo::{Pid, Process, ProcessStatus, ProcessesToUpdate, Signal, System};

const KILL_VERIFY_MAX_ELAPSED: Duration = Duration::from_secs(5);

/// PIDs that must never be signalled: the idle task and init.
const PROTECTED_PIDS: [u32; 2] = [0, 1];

pub(crate) fn with_process<F, R>(pid: u32, f: F) -> Option<R>
where
    F: FnOnce(&Process) -> R,
{
    let target = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[target]), true);

    sys.process(target).map(f)
}

pub(crate) fn format_command(process: &Process) -> String {
    let cmd_vec: Vec<String> = process
        .cmd()
        .iter()
        .map(|s| s.to_string_lossy().to_string())
        .collect();

    if cmd_vec.is_empty() {
        process.name().to_string_lossy().to_string()
    } else {
        cmd_vec.join(" ")
    }
}

/// Short `name (PID n)` description, or `None` if the PID is gone.
pub fn describe_pid(pid: u32) -> Option<String> {
    with_process(pid, |p| format!("{} (PID {pid})", p.name().to_string_lossy()))
}

/// Whether a PID refers to a live, non-zombie process.
pub fn is_alive(pid: u32) -> bool {
    with_process(pid, |p| p.status() != ProcessStatus::Zombie).unwrap_or(false)
}

/// Ask a process to shut down with SIGTERM.
///
/// Returns `false` if the PID is protected, missing, or the platform has no
/// SIGTERM (callers fall back to a hard kill).
pub fn terminate(pid: u32) -> bool {
    if PROTECTED_PIDS.contains(&pid) {
        warn!("Refusing to signal protected PID {pid}");
        return false;
    }

    with_process(pid, |p| p.kill_with(Signal::Term).unwrap_or(false)).unwrap_or_else(|| {
        debug!("Process {pid} not found");
        false
    })
}

/// Stop a server process by PID.
///
/// Attempts graceful termination (SIGTERM) first, falls back to force kill (SIGKILL).
/// Uses exponential backoff to verify the process has terminated, waiting up to 5 seconds.
///
/// # Returns
///
/// * `true` - If the process was successfully terminated
/// * `false` - If the process doesn't exist, is protected, or couldn't be killed
pub fn stop_pid(pid: u32) -> bool {
    if PROTECTED_PIDS.contains(&pid) {
        warn!("Refusing to stop protected PID {pid}");
        return false;
    }

    let killed = with_process(pid, |p| {
        if let Some(sent) = p.kill_with(Signal::Term) {
            debug!("Sent SIGTERM to PID {pid}: success={sent}");
            sent
        } else {
            let killed = p.kill();
            debug!("Sent SIGKILL to PID {pid}: success={killed}");
            killed
        }
    })
    .unwrap_or_else(|| {
        debug!("Process {pid} not found");
        false
    });

    if !killed {
        return false;
    }

    let mut backoff = ExponentialBackoff {
        max_elapsed_time: Some(KILL_VERIFY_MAX_ELAPSED),
        ..Default::default()
    };

    loop {
        if !is_alive(pid) {
            debug!("Process {pid} successfully terminated");
            return true;
        }

        match backoff.next_backoff() {
            Some(duration) => {
                trace!("Process {pid} still alive, retrying after {duration:?}");
                sleep(duration);
            }
            None => {
                debug!("Process {pid} ignored SIGTERM, sending SIGKILL");
                let killed = with_process(pid, |p| p.kill()).unwrap_or(false);
                return killed || !is_alive(pid);
            }
        }
    }
}
