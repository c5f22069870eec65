use crate::helpers::{
    LOCALHOST, READY_TIMEOUT, free_port, manager, stub_config, stub_config_on, stub_launcher,
};

use lifecycle_core::lock::{LOCK_FILE_NAME, read_lock, stop_recorded_server};
use lifecycle_core::port::{accepts_connections, is_available, wait_until_free};

use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

// ============================================================================
// Happy-path lifecycle against the stub server
// ============================================================================

/// **VALUE**: Verifies the full start → ready → stop cycle.
///
/// **WHY THIS MATTERS**: This is what every build task does. Each step leaves observable
/// state (a process, a lock file, a bound port) and each must be cleaned up.
///
/// **BUG THIS CATCHES**: Would catch readiness passing before the port accepts connections,
/// or stop returning while the port is still bound.
#[tokio::test]
#[serial]
async fn given_free_port_when_started_and_stopped_then_port_is_released() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let config = stub_config(dir.path());
    let port = config.port;
    let mut manager = manager(stub_launcher());

    // WHEN: Start and wait
    let handle = manager.start(config).await.unwrap();
    manager.wait_until_ready(&handle, READY_TIMEOUT).await.unwrap();

    // THEN: Server is reachable and described
    assert!(accepts_connections(LOCALHOST, port, Duration::from_secs(1)).await);
    let info = manager.info(&handle).expect("info for running server");
    assert!(info.ready);
    assert_eq!(info.port, port);
    assert!(info.pid > 0);
    assert!(info.command.contains(&port.to_string()));
    assert!(manager.is_running(&handle));
    assert_eq!(manager.running_handles(), vec![handle.clone()]);

    // WHEN: Stop
    manager.stop(&handle).await.unwrap();

    // THEN: Nothing left behind
    assert!(is_available(LOCALHOST, port), "port {port} should be free after stop");
    assert!(manager.info(&handle).is_none());
    assert!(!manager.is_running(&handle));
    assert!(manager.running_handles().is_empty());
}

/// **VALUE**: Verifies start is idempotent for an identical config.
///
/// **WHY THIS MATTERS**: Several build tasks may share one database. The second start must
/// hand back the same server instead of failing on the port it already holds.
///
/// **BUG THIS CATCHES**: Would catch a second spawn (and a `PortUnavailable` from it).
#[tokio::test]
#[serial]
async fn given_running_server_when_started_again_then_returns_same_handle() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let config = stub_config(dir.path());
    let mut manager = manager(stub_launcher());
    let first = manager.start(config.clone()).await.unwrap();
    manager.wait_until_ready(&first, READY_TIMEOUT).await.unwrap();
    let pid = manager.info(&first).unwrap().pid;

    // WHEN
    let second = manager.start(config).await.unwrap();

    // THEN
    assert_eq!(first, second);
    assert_eq!(manager.info(&second).unwrap().pid, pid);

    manager.stop_all().await.unwrap();
}

/// **VALUE**: Verifies stop is idempotent.
///
/// **BUG THIS CATCHES**: Would catch cleanup code paths (after-test hooks, Drop) erroring
/// because a server was already stopped explicitly.
#[tokio::test]
#[serial]
async fn given_stopped_server_when_stopped_again_then_succeeds() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let mut manager = manager(stub_launcher());
    let handle = manager.start(stub_config(dir.path())).await.unwrap();
    manager.stop(&handle).await.unwrap();

    // WHEN / THEN
    assert!(manager.stop(&handle).await.is_ok());
    assert!(manager.stop_all().await.is_ok());
}

/// **VALUE**: Verifies the lock file tracks the running server.
///
/// **WHY THIS MATTERS**: `h2ctl stop` from another shell relies on the lock to find the PID.
#[tokio::test]
#[serial]
async fn given_running_server_when_inspecting_data_dir_then_lock_names_server_pid() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let mut manager = manager(stub_launcher());
    let handle = manager.start(stub_config(dir.path())).await.unwrap();
    let pid = manager.info(&handle).unwrap().pid;

    // WHEN
    let record = read_lock(dir.path()).unwrap().expect("lock while running");

    // THEN
    assert_eq!(record.server_pid, Some(pid));
    assert_eq!(record.port, handle.port());

    manager.stop(&handle).await.unwrap();
    assert!(!dir.path().join(LOCK_FILE_NAME).exists());
}

/// **VALUE**: Verifies a server can be stopped through its lock record alone.
///
/// **BUG THIS CATCHES**: Would catch the recorded PID being the manager's instead of the
/// server's.
#[tokio::test]
#[serial]
async fn given_running_server_when_stopped_via_lock_record_then_process_exits() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let mut manager = manager(stub_launcher());
    let handle = manager.start(stub_config(dir.path())).await.unwrap();
    manager.wait_until_ready(&handle, READY_TIMEOUT).await.unwrap();

    // WHEN
    let record = stop_recorded_server(dir.path()).unwrap();

    // THEN
    assert!(record.is_some());
    assert!(wait_until_free(LOCALHOST, handle.port(), Duration::from_secs(5)).await);
    assert!(!manager.is_running(&handle));
    assert!(manager.stop(&handle).await.is_ok());
}

/// **VALUE**: Verifies dropping the manager kills its servers and removes locks.
///
/// **WHY THIS MATTERS**: A panicking test drops the manager without calling stop. The
/// server must not outlive the test binary's interest in it.
#[tokio::test]
#[serial]
async fn given_running_server_when_manager_dropped_then_server_is_killed() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let mut manager = manager(stub_launcher());
    let handle = manager.start(stub_config(dir.path())).await.unwrap();
    manager.wait_until_ready(&handle, READY_TIMEOUT).await.unwrap();

    // WHEN
    drop(manager);

    // THEN
    assert!(!dir.path().join(LOCK_FILE_NAME).exists());
    assert!(wait_until_free(LOCALHOST, handle.port(), Duration::from_secs(5)).await);
}

/// **VALUE**: Verifies `stop_all()` stops several servers.
#[tokio::test]
#[serial]
async fn given_two_servers_when_stop_all_called_then_both_ports_are_released() {
    // GIVEN: Two servers with separate data directories
    let first_dir = TempDir::new().unwrap();
    let second_dir = TempDir::new().unwrap();
    let first_port = free_port();
    let second_port = std::iter::repeat_with(free_port)
        .find(|&p| p != first_port)
        .unwrap();
    let mut manager = manager(stub_launcher());
    let first = manager
        .start(stub_config_on(first_port, first_dir.path()))
        .await
        .unwrap();
    let second = manager
        .start(stub_config_on(second_port, second_dir.path()))
        .await
        .unwrap();
    manager.wait_until_ready(&first, READY_TIMEOUT).await.unwrap();
    manager.wait_until_ready(&second, READY_TIMEOUT).await.unwrap();

    // WHEN
    manager.stop_all().await.unwrap();

    // THEN
    assert!(is_available(LOCALHOST, first.port()));
    assert!(is_available(LOCALHOST, second.port()));
    assert!(manager.running_handles().is_empty());
}
