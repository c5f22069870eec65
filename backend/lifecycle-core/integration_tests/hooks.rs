use crate::helpers::{LOCALHOST, READY_TIMEOUT, manager, stub_config, stub_launcher, stub_launcher_with};

use lifecycle_core::error::LifecycleError;
use lifecycle_core::lock::LOCK_FILE_NAME;
use lifecycle_core::port::{accepts_connections, is_available};
use lifecycle_core::{DatabaseSession, with_database};

use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

#[derive(Debug)]
enum BodyError {
    Lifecycle(LifecycleError),
    Assertion(&'static str),
}

impl From<LifecycleError> for BodyError {
    fn from(error: LifecycleError) -> Self {
        BodyError::Lifecycle(error)
    }
}

// ============================================================================
// Before/after hooks as used by a test harness
// ============================================================================

/// **VALUE**: Verifies `with_database()` hands a ready server to the body and stops it after.
///
/// **WHY THIS MATTERS**: This is the one-liner integration test suites use. If teardown is
/// skipped, the next suite in the same CI job fails on the port.
#[tokio::test]
#[serial]
async fn given_successful_body_when_with_database_then_returns_value_and_stops_server() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let config = stub_config(dir.path());
    let port = config.port;
    let mut manager = manager(stub_launcher());

    // WHEN
    let result: Result<u16, BodyError> = with_database(&mut manager, config, READY_TIMEOUT, |info| async move {
        if accepts_connections(LOCALHOST, info.port, Duration::from_secs(1)).await {
            Ok(info.port)
        } else {
            Err(BodyError::Assertion("database not reachable inside body"))
        }
    })
    .await;

    // THEN
    assert_eq!(result.unwrap(), port);
    assert!(is_available(LOCALHOST, port));
    assert!(manager.running_handles().is_empty());
}

/// **VALUE**: Verifies teardown still runs when the body fails, and the body's error wins.
///
/// **BUG THIS CATCHES**: Would catch `?` on the body result skipping the stop.
#[tokio::test]
#[serial]
async fn given_failing_body_when_with_database_then_returns_body_error_and_stops_server() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let config = stub_config(dir.path());
    let port = config.port;
    let mut manager = manager(stub_launcher());

    // WHEN
    let result: Result<(), BodyError> = with_database(&mut manager, config, READY_TIMEOUT, |_| async {
        Err(BodyError::Assertion("expected row missing"))
    })
    .await;

    // THEN
    assert!(matches!(result, Err(BodyError::Assertion("expected row missing"))));
    assert!(is_available(LOCALHOST, port));
    assert!(!dir.path().join(LOCK_FILE_NAME).exists());
}

/// **VALUE**: Verifies a failed start surfaces as the lifecycle error and never runs the body.
#[tokio::test]
#[serial]
async fn given_crashing_server_when_with_database_then_body_is_skipped() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let mut manager = manager(stub_launcher_with(&["--fail-with", "2"]));

    // WHEN
    let result: Result<(), BodyError> = with_database(&mut manager, stub_config(dir.path()), READY_TIMEOUT, |_| async {
        Err(BodyError::Assertion("body must not run"))
    })
    .await;

    // THEN
    assert!(
        matches!(result, Err(BodyError::Lifecycle(LifecycleError::ProcessExited { .. }))),
        "got {result:?}"
    );
    assert!(manager.running_handles().is_empty());
}

/// **VALUE**: Verifies the explicit before/after pair used by harnesses without closures.
///
/// **BUG THIS CATCHES**: Would catch a second `after_test()` erroring or stopping twice.
#[tokio::test]
#[serial]
async fn given_session_when_before_and_after_test_then_server_lives_in_between() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let config = stub_config(dir.path());
    let port = config.port;
    let mut manager = manager(stub_launcher());
    let mut session = DatabaseSession::new(&mut manager, config, READY_TIMEOUT);

    // WHEN: before_test
    let info = session.before_test().await.unwrap();

    // THEN
    assert!(info.ready);
    assert_eq!(session.handle().map(|h| h.port()), Some(port));
    assert!(!is_available(LOCALHOST, port));

    // WHEN: after_test, twice
    session.after_test().await.unwrap();
    session.after_test().await.unwrap();

    // THEN
    assert!(session.handle().is_none());
    assert!(is_available(LOCALHOST, port));
}

/// **VALUE**: Verifies `before_test()` cleans up when readiness fails.
#[tokio::test]
#[serial]
async fn given_slow_server_when_before_test_times_out_then_nothing_is_left_running() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let mut manager = manager(stub_launcher_with(&["--listen-after-ms", "10000"]));
    let mut session = DatabaseSession::new(&mut manager, stub_config(dir.path()), Duration::from_millis(300));

    // WHEN
    let result = session.before_test().await;

    // THEN
    assert!(matches!(result, Err(LifecycleError::ReadinessTimeout { .. })));
    assert!(session.handle().is_none());
    drop(session);
    assert!(manager.running_handles().is_empty());
    assert!(!dir.path().join(LOCK_FILE_NAME).exists());
}
