use crate::error::LifecycleError;
use crate::lock::{LockRecord, ServerLock, lock_path, read_lock, stop_recorded_server};

use std::fs;

use tempfile::TempDir;

fn dead_record(port: u16) -> LockRecord {
    LockRecord {
        owner_pid: u32::MAX,
        server_pid: Some(u32::MAX - 1),
        host: "127.0.0.1".to_string(),
        port,
        started_at: "2024-01-01T00:00:00Z".to_string(),
    }
}

/// **VALUE**: Verifies the lock file lives exactly as long as the guard.
///
/// **WHY THIS MATTERS**: A lock left behind after a clean stop would make the next build
/// report `LockHeld` or, worse, stop an unrelated process that reused the PID.
///
/// **BUG THIS CATCHES**: Would catch the Drop impl being removed.
#[test]
fn given_acquired_lock_when_dropped_then_file_is_removed() {
    // GIVEN
    let dir = TempDir::new().unwrap();

    // WHEN: Acquiring, recording the server, then dropping
    {
        let mut lock = ServerLock::acquire(dir.path(), LockRecord::new("127.0.0.1", 9092)).unwrap();
        lock.set_server_pid(4242).unwrap();

        // THEN (while held): The record is on disk with the server PID
        let on_disk = read_lock(dir.path()).unwrap().unwrap();
        assert_eq!(on_disk.server_pid, Some(4242));
        assert_eq!(on_disk.owner_pid, std::process::id());
        assert_eq!(on_disk.port, 9092);
        assert_eq!(lock.path(), lock_path(dir.path()));
    }

    // THEN (after drop): Gone
    assert!(!lock_path(dir.path()).exists());
}

/// **VALUE**: Verifies a live owner blocks a second acquisition.
///
/// **WHY THIS MATTERS**: Two H2 servers on one base directory corrupt each other's files.
///
/// **BUG THIS CATCHES**: Would catch the liveness check being skipped.
#[test]
fn given_lock_held_by_live_process_when_acquiring_then_returns_lock_held() {
    // GIVEN: A lock owned by this (live) process
    let dir = TempDir::new().unwrap();
    let _held = ServerLock::acquire(dir.path(), LockRecord::new("127.0.0.1", 9092)).unwrap();

    // WHEN
    let second = ServerLock::acquire(dir.path(), LockRecord::new("127.0.0.1", 9093));

    // THEN
    match second {
        Err(LifecycleError::LockHeld { pid, .. }) => assert_eq!(pid, std::process::id()),
        other => panic!("Expected LockHeld, got {other:?}"),
    }
}

/// **VALUE**: Verifies stale locks from crashed runs are taken over.
///
/// **BUG THIS CATCHES**: Would catch a killed CI job permanently blocking the data directory.
#[test]
fn given_stale_lock_when_acquiring_then_replaces_it() {
    // GIVEN: A lock naming only dead PIDs
    let dir = TempDir::new().unwrap();
    fs::write(
        lock_path(dir.path()),
        serde_json::to_string(&dead_record(9000)).unwrap(),
    )
    .unwrap();

    // WHEN
    let lock = ServerLock::acquire(dir.path(), LockRecord::new("127.0.0.1", 9092)).unwrap();

    // THEN
    assert_eq!(read_lock(dir.path()).unwrap().unwrap().port, 9092);
    assert_eq!(lock.record().port, 9092);
}

/// **VALUE**: Verifies garbage in the lock file doesn't wedge startup.
#[test]
fn given_corrupt_lock_when_acquiring_then_replaces_it() {
    let dir = TempDir::new().unwrap();
    fs::write(lock_path(dir.path()), "not json").unwrap();

    assert!(read_lock(dir.path()).is_err());
    assert!(ServerLock::acquire(dir.path(), LockRecord::new("127.0.0.1", 9092)).is_ok());
}

/// **VALUE**: Verifies explicit release is idempotent with drop.
#[test]
fn given_released_lock_when_dropped_then_no_error() {
    let dir = TempDir::new().unwrap();
    let mut lock = ServerLock::acquire(dir.path(), LockRecord::new("127.0.0.1", 9092)).unwrap();

    lock.release();
    lock.release();

    assert!(!lock_path(dir.path()).exists());
}

/// **VALUE**: Verifies `stop_recorded_server()` clears locks whose server is already gone.
///
/// **WHY THIS MATTERS**: `h2ctl stop` after a crash should leave a clean directory, not fail.
#[test]
fn given_stale_lock_when_stop_recorded_server_called_then_clears_lock() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    fs::write(
        lock_path(dir.path()),
        serde_json::to_string(&dead_record(9001)).unwrap(),
    )
    .unwrap();

    // WHEN
    let record = stop_recorded_server(dir.path()).unwrap();

    // THEN
    assert_eq!(record.map(|r| r.port), Some(9001));
    assert!(!lock_path(dir.path()).exists());
}

/// **VALUE**: Verifies an empty directory is a no-op for `stop_recorded_server()`.
#[test]
fn given_no_lock_when_stop_recorded_server_called_then_returns_none() {
    let dir = TempDir::new().unwrap();

    assert!(stop_recorded_server(dir.path()).unwrap().is_none());
}

/// **VALUE**: Verifies lock write failures point at the code that asked for the lock.
///
/// **WHY THIS MATTERS**: The `[file:line:column]` suffix is how users find which start call
/// failed in a large build script.
///
/// **BUG THIS CATCHES**: Would catch the location being captured inside a helper closure,
/// which always reports the same line of `lock.rs`.
#[test]
fn given_missing_directory_when_acquiring_then_error_location_is_the_caller() {
    // GIVEN: A data directory that was never created
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("never-created");

    // WHEN
    let (result, line) = (
        ServerLock::acquire(&missing, LockRecord::new("127.0.0.1", 9092)),
        line!(),
    );

    // THEN
    match result {
        Err(LifecycleError::Lock { location, .. }) => {
            assert!(location.file.ends_with("tests/lock.rs"), "got {location}");
            assert_eq!(location.line, line - 1);
        }
        other => panic!("Expected Lock error, got {other:?}"),
    }
}
