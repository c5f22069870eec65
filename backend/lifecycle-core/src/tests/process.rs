// Unit tests for process module private helpers

use crate::process::{format_command, is_alive, stop_pid, terminate, with_process};

/// **VALUE**: Tests that `with_process()` gracefully handles non-existent PIDs.
///
/// **WHY THIS MATTERS**: A lock file can name a server that died long ago. Looking it up
/// must yield `None`, not a panic.
///
/// **BUG THIS CATCHES**: Would catch if the lookup starts unwrapping the process entry.
#[test]
fn given_nonexistent_pid_when_with_process_called_then_returns_none() {
    // GIVEN: A PID that doesn't exist
    let fake_pid = u32::MAX;

    // WHEN: Calling with_process with the invalid PID
    let result = with_process(fake_pid, |_| true);

    // THEN: Should return None
    assert!(result.is_none(), "Should return None for non-existent process");
}

/// **VALUE**: Tests the `format_command()` helper on a real process.
///
/// **BUG THIS CATCHES**: Would catch an empty description for processes with a command line.
#[test]
fn given_own_process_when_format_command_called_then_returns_command_string() {
    // GIVEN: Our own PID
    let our_pid = std::process::id();

    // WHEN: Formatting its command
    let cmd = with_process(our_pid, format_command);

    // THEN: Non-empty description
    assert!(cmd.is_some_and(|c| !c.is_empty()));
}

/// **VALUE**: Verifies liveness reporting for the current and a missing process.
///
/// **WHY THIS MATTERS**: Stale lock detection rests entirely on `is_alive()`.
///
/// **BUG THIS CATCHES**: Would catch a stale lock being treated as held (or the reverse).
#[test]
fn given_own_and_missing_pid_when_is_alive_called_then_reports_correctly() {
    assert!(is_alive(std::process::id()));
    assert!(!is_alive(u32::MAX));
}

/// **VALUE**: Verifies that init and the idle task are never signalled.
///
/// **WHY THIS MATTERS**: A corrupted lock file containing PID 1 must not take the machine
/// (or the container) down.
///
/// **BUG THIS CATCHES**: Would catch removal of the protected PID guard.
#[test]
fn given_protected_pid_when_stopping_then_refuses() {
    // GIVEN / WHEN / THEN
    assert!(!terminate(0));
    assert!(!terminate(1));
    assert!(!stop_pid(1));
}

/// **VALUE**: Verifies stopping a PID that doesn't exist reports failure quickly.
///
/// **BUG THIS CATCHES**: Would catch `stop_pid()` claiming success for processes it never saw.
#[test]
fn given_nonexistent_pid_when_stop_pid_called_then_returns_false() {
    assert!(!stop_pid(u32::MAX));
}

/// **VALUE**: End-to-end check that `stop_pid()` terminates a real child.
///
/// **BUG THIS CATCHES**: Would catch SIGTERM never being delivered or the verify loop
/// giving up early.
#[cfg(unix)]
#[test]
fn given_sleeping_child_when_stop_pid_called_then_process_terminates() {
    // GIVEN: A long-running child
    let mut child = std::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .expect("sleep should be available on unix");
    let pid = child.id();

    // Reap in the background so the child doesn't linger as a zombie
    let reaper = std::thread::spawn(move || child.wait());

    // WHEN: Stopping by PID
    let stopped = stop_pid(pid);

    // THEN: The process is gone
    assert!(stopped, "stop_pid should report success");
    let status = reaper.join().expect("reaper thread").expect("wait");
    assert!(!status.success(), "sleep should have been killed, not finished");
}
