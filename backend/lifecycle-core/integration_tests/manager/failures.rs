use crate::helpers::{
    LOCALHOST, READY_TIMEOUT, free_port, manager, stub_config, stub_config_on, stub_launcher,
    stub_launcher_with,
};

use lifecycle_core::error::LifecycleError;
use lifecycle_core::lock::LOCK_FILE_NAME;
use lifecycle_core::port::is_available;
use lifecycle_core::{CommandLauncher, LifecycleManager};

use models::ServerConfigBuilder;

use std::net::TcpListener;
use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

// ============================================================================
// Each failure is reported as its own error kind, never retried
// ============================================================================

/// **VALUE**: Verifies a taken TCP port fails fast with `PortUnavailable`.
///
/// **WHY THIS MATTERS**: Spawning anyway would leave a server that dies on bind, reported
/// as a vague `ProcessExited` several seconds later.
///
/// **BUG THIS CATCHES**: Would catch the pre-spawn port check being skipped.
#[tokio::test]
#[serial]
async fn given_port_in_use_when_starting_then_returns_port_unavailable() {
    // GIVEN: Someone else holds the port
    let squatter = TcpListener::bind((LOCALHOST, 0)).unwrap();
    let port = squatter.local_addr().unwrap().port();
    let dir = TempDir::new().unwrap();
    let mut manager = manager(stub_launcher());

    // WHEN
    let result = manager.start(stub_config_on(port, dir.path())).await;

    // THEN: Reported, nothing spawned, no lock left
    match result {
        Err(LifecycleError::PortUnavailable { port: reported, .. }) => assert_eq!(reported, port),
        other => panic!("Expected PortUnavailable, got {other:?}"),
    }
    assert!(manager.running_handles().is_empty());
    assert!(!dir.path().join(LOCK_FILE_NAME).exists());
}

/// **VALUE**: Verifies the web console port is checked too.
#[tokio::test]
#[serial]
async fn given_web_port_in_use_when_starting_then_returns_port_unavailable() {
    // GIVEN
    let squatter = TcpListener::bind((LOCALHOST, 0)).unwrap();
    let web_port = squatter.local_addr().unwrap().port();
    let dir = TempDir::new().unwrap();
    let config = ServerConfigBuilder::default()
        .with_port(free_port())
        .with_web_port(web_port)
        .with_data_dir(dir.path())
        .build()
        .unwrap();
    let mut manager = manager(stub_launcher());

    // WHEN
    let result = manager.start(config).await;

    // THEN
    assert!(
        matches!(result, Err(LifecycleError::PortUnavailable { port, .. }) if port == web_port),
        "got {result:?}"
    );
}

/// **VALUE**: Verifies an unusable data directory is reported as `InvalidPath`.
///
/// **BUG THIS CATCHES**: Would catch an I/O error escaping as a panic or as a lock error.
#[tokio::test]
#[serial]
async fn given_data_dir_below_a_file_when_starting_then_returns_invalid_path() {
    // GIVEN: A path whose parent is a regular file
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("not-a-dir");
    std::fs::write(&file, b"x").unwrap();
    let mut manager = manager(stub_launcher());

    // WHEN
    let result = manager.start(stub_config(&file.join("data"))).await;

    // THEN
    assert!(
        matches!(result, Err(LifecycleError::InvalidPath { .. })),
        "got {result:?}"
    );
}

/// **VALUE**: Verifies a directory that exists but refuses writes is `InvalidPath`.
///
/// **WHY THIS MATTERS**: Permission bits can claim a directory is writable (ACLs, read-only
/// mounts, `/proc`); the user should hear about the path, not about a lock file.
///
/// **BUG THIS CATCHES**: Would catch writability being judged from permission bits only,
/// which lets the failure surface later as `LifecycleError::Lock`.
#[cfg(target_os = "linux")]
#[tokio::test]
#[serial]
async fn given_unwritable_existing_dir_when_starting_then_returns_invalid_path() {
    // GIVEN: A pseudo-filesystem directory nobody can create files in, even as root
    let unwritable = ["/sys/kernel", "/proc/self"]
        .into_iter()
        .map(std::path::Path::new)
        .find(|p| p.is_dir())
        .expect("sysfs or procfs should be mounted");
    let mut manager = manager(stub_launcher());

    // WHEN
    let result = manager.start(stub_config(unwritable)).await;

    // THEN
    match result {
        Err(LifecycleError::InvalidPath { ref path, ref reason, .. }) => {
            assert_eq!(path, unwritable);
            assert!(reason.contains("not writable"), "reason: {reason}");
        }
        other => panic!("Expected InvalidPath, got {other:?}"),
    }
}

/// **VALUE**: Verifies a server that never listens yields `ReadinessTimeout`.
///
/// **WHY THIS MATTERS**: A hung JVM must fail the build within the configured budget
/// instead of blocking CI forever.
///
/// **BUG THIS CATCHES**: Would catch the poll loop ignoring its deadline.
#[tokio::test]
#[serial]
async fn given_slow_server_when_waiting_then_returns_readiness_timeout() {
    // GIVEN: A stub that binds only after 10 seconds
    let dir = TempDir::new().unwrap();
    let mut manager = manager(stub_launcher_with(&["--listen-after-ms", "10000"]));
    let handle = manager.start(stub_config(dir.path())).await.unwrap();

    // WHEN
    let started = std::time::Instant::now();
    let result = manager
        .wait_until_ready(&handle, Duration::from_millis(500))
        .await;

    // THEN: Timed out near the budget, server still owned so it can be stopped
    match result {
        Err(LifecycleError::ReadinessTimeout { port, elapsed, .. }) => {
            assert_eq!(port, handle.port());
            assert!(elapsed >= Duration::from_millis(400), "elapsed {elapsed:?}");
        }
        other => panic!("Expected ReadinessTimeout, got {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(manager.is_running(&handle));

    manager.stop(&handle).await.unwrap();
    assert!(!manager.is_running(&handle));
}

/// **VALUE**: Verifies a server that dies during startup yields `ProcessExited` with its
/// stderr.
///
/// **WHY THIS MATTERS**: Waiting out the full timeout for a process that is already dead
/// wastes CI time and hides the real cause (bad jar, wrong Java version).
///
/// **BUG THIS CATCHES**: Would catch readiness polling not checking the child's status.
#[tokio::test]
#[serial]
async fn given_crashing_server_when_waiting_then_returns_process_exited() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let mut manager = manager(stub_launcher_with(&["--fail-with", "3"]));
    let handle = manager.start(stub_config(dir.path())).await.unwrap();

    // WHEN
    let result = manager.wait_until_ready(&handle, READY_TIMEOUT).await;

    // THEN
    match result {
        Err(LifecycleError::ProcessExited {
            status,
            stderr_tail,
            ..
        }) => {
            assert!(status.contains('3'), "status: {status}");
            assert!(stderr_tail.contains("refusing to start"), "stderr: {stderr_tail}");
        }
        other => panic!("Expected ProcessExited, got {other:?}"),
    }

    manager.stop(&handle).await.unwrap();
    assert!(!dir.path().join(LOCK_FILE_NAME).exists());
}

/// **VALUE**: Verifies a crashed server is replaced by the next start.
#[tokio::test]
#[serial]
async fn given_exited_server_when_started_again_then_spawns_new_process() {
    // GIVEN: A crashed server still registered
    let dir = TempDir::new().unwrap();
    let config = stub_config(dir.path());
    let mut manager = manager(stub_launcher_with(&["--fail-with", "1"]));
    let first = manager.start(config.clone()).await.unwrap();
    assert!(manager.wait_until_ready(&first, READY_TIMEOUT).await.is_err());

    // WHEN
    let second = manager.start(config).await.unwrap();

    // THEN
    assert_ne!(first, second);
    assert!(manager.info(&first).is_none());
    manager.stop_all().await.unwrap();
}

/// **VALUE**: Verifies a different config on an occupied port is a `ConfigConflict`.
///
/// **WHY THIS MATTERS**: Silently reusing the running server would point a test at the
/// wrong data directory.
#[tokio::test]
#[serial]
async fn given_running_server_when_started_with_other_config_then_returns_config_conflict() {
    // GIVEN
    let first_dir = TempDir::new().unwrap();
    let other_dir = TempDir::new().unwrap();
    let config = stub_config(first_dir.path());
    let port = config.port;
    let mut manager = manager(stub_launcher());
    let handle = manager.start(config).await.unwrap();

    // WHEN
    let result = manager.start(stub_config_on(port, other_dir.path())).await;

    // THEN
    assert!(
        matches!(result, Err(LifecycleError::ConfigConflict { port: p, .. }) if p == port),
        "got {result:?}"
    );
    assert!(manager.is_running(&handle));
    manager.stop(&handle).await.unwrap();
}

/// **VALUE**: Verifies two managers can't share a data directory.
///
/// **BUG THIS CATCHES**: Would catch the lock being written but never checked.
#[tokio::test]
#[serial]
async fn given_locked_data_dir_when_other_manager_starts_then_returns_lock_held() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let mut first = manager(stub_launcher());
    let mut second = manager(stub_launcher());
    let handle = first.start(stub_config(dir.path())).await.unwrap();

    // WHEN
    let result = second.start(stub_config(dir.path())).await;

    // THEN
    assert!(
        matches!(result, Err(LifecycleError::LockHeld { .. })),
        "got {result:?}"
    );
    first.stop(&handle).await.unwrap();
}

/// **VALUE**: Verifies a missing program is a `Spawn` error and releases the lock.
#[tokio::test]
#[serial]
async fn given_missing_program_when_starting_then_returns_spawn_error() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let launcher = CommandLauncher::new("/nonexistent/db-server", ["--port", "{port}"]);
    let mut manager = LifecycleManager::new(launcher);

    // WHEN
    let result = manager.start(stub_config(dir.path())).await;

    // THEN
    assert!(matches!(result, Err(LifecycleError::Spawn { .. })), "got {result:?}");
    assert!(!dir.path().join(LOCK_FILE_NAME).exists());
}

/// **VALUE**: Verifies waiting on a stopped handle is reported, not ignored.
#[tokio::test]
#[serial]
async fn given_stopped_handle_when_waiting_then_returns_unknown_handle() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let mut manager = manager(stub_launcher());
    let handle = manager.start(stub_config(dir.path())).await.unwrap();
    manager.stop(&handle).await.unwrap();

    // WHEN
    let result = manager.wait_until_ready(&handle, READY_TIMEOUT).await;

    // THEN
    assert!(matches!(result, Err(LifecycleError::UnknownHandle { .. })));
    assert!(is_available(LOCALHOST, handle.port()));
}
