use crate::cli::{CheckArgs, RunArgs, StopArgs};
use crate::commands::{check, config, run, stop};
use crate::error::H2ctlError;

use lifecycle_core::config::LifecycleConfig;
use lifecycle_core::error::{ConfigError, CoreError, LifecycleError};
use lifecycle_core::lock::{LockRecord, ServerLock, lock_path};
use lifecycle_core::{CommandLauncher, ConfiguredLauncher, H2Launcher};
use models::{ServerInfo, StorageMode};

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use tempfile::TempDir;

fn run_args() -> RunArgs {
    RunArgs {
        port: None,
        data_dir: None,
        ready_timeout: None,
        command: Vec::new(),
    }
}

fn info(announced_url: Option<&str>) -> ServerInfo {
    ServerInfo {
        pid: 42,
        host: "127.0.0.1".to_string(),
        port: 9092,
        web_port: None,
        data_dir: PathBuf::from("/tmp/db"),
        mode: StorageMode::File,
        command: "java".to_string(),
        announced_url: announced_url.map(str::to_string),
        ready: true,
    }
}

/// **VALUE**: Verifies command-line values win over the config file for `run`.
#[test]
fn given_run_overrides_when_building_server_config_then_overrides_win() {
    // GIVEN
    let mut config = LifecycleConfig::default();
    config.server.data_dir = Some("/tmp/from-file".into());
    let args = RunArgs {
        port: Some(19093),
        data_dir: Some("/tmp/from-cli".into()),
        ..run_args()
    };

    // WHEN
    let server = run::server_config(&config, &args).unwrap();

    // THEN
    assert_eq!(server.port, 19093);
    assert_eq!(server.data_dir, Path::new("/tmp/from-cli"));
}

/// **VALUE**: Verifies overrides are validated like file values.
///
/// **BUG THIS CATCHES**: Would catch `--port 0` slipping past validation.
#[test]
fn given_zero_port_override_when_building_server_config_then_returns_validation_error() {
    let mut config = LifecycleConfig::default();
    config.server.data_dir = Some("/tmp/from-file".into());
    let args = RunArgs {
        port: Some(0),
        ..run_args()
    };

    let result = run::server_config(&config, &args);

    assert!(matches!(
        result,
        Err(H2ctlError::Core(CoreError::Lifecycle(LifecycleError::Model(_))))
    ));
}

/// **VALUE**: Verifies wrapped commands get the announced URL when there is one.
#[test]
fn given_server_info_when_building_tcp_url_then_prefers_announced_url() {
    assert_eq!(run::tcp_url(&info(Some("tcp://10.1.1.1:9092"))), "tcp://10.1.1.1:9092");
    assert_eq!(run::tcp_url(&info(None)), "tcp://127.0.0.1:9092");
}

/// **VALUE**: Verifies the rendered config never contains the password.
///
/// **WHY THIS MATTERS**: `h2ctl config` output is routinely pasted into CI logs and tickets.
#[test]
fn given_password_when_rendering_config_then_password_is_omitted() {
    // GIVEN
    let mut config = LifecycleConfig::default();
    config.server.user = Some("sa".to_string());
    config.server.password = Some(common::RedactedPassword::new("hunter2"));
    config.server.data_dir = Some("/srv/h2".into());

    // WHEN
    let rendered = config::render(&config).unwrap();

    // THEN
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.starts_with("# data_dir: configured"));
    assert!(rendered.contains("/srv/h2"));
    let reparsed: LifecycleConfig = toml::from_str(&rendered).unwrap();
    assert_eq!(reparsed.server.user.as_deref(), Some("sa"));
}

/// **VALUE**: Verifies `check` succeeds against a listening port.
#[tokio::test]
async fn given_listening_port_when_checking_then_succeeds() {
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let args = CheckArgs {
        host: Some("127.0.0.1".to_string()),
        port: Some(listener.local_addr().unwrap().port()),
        timeout: Some(Duration::from_secs(2)),
    };

    let result = check::execute(&LifecycleConfig::default(), &args).await;

    assert!(matches!(result, Ok(code) if code == ExitCode::SUCCESS));
}

/// **VALUE**: Verifies `check` fails with a readiness timeout when nothing listens.
#[tokio::test]
async fn given_closed_port_when_checking_then_returns_readiness_timeout() {
    let port = lifecycle_core::port::allocate_port("127.0.0.1").unwrap();
    let args = CheckArgs {
        host: Some("127.0.0.1".to_string()),
        port: Some(port),
        timeout: Some(Duration::from_millis(200)),
    };

    let result = check::execute(&LifecycleConfig::default(), &args).await;

    assert!(matches!(
        result,
        Err(H2ctlError::Core(CoreError::Lifecycle(LifecycleError::ReadinessTimeout { .. })))
    ));
}

fn config_with_launcher(launcher: ConfiguredLauncher, data_dir: &Path) -> LifecycleConfig {
    let mut config = LifecycleConfig::default();
    config.launcher = launcher;
    config.server.data_dir = Some(data_dir.to_path_buf());
    config.server.web_console = false;
    config
}

/// H2 launcher whose "java" is a stand-in that always succeeds or always fails.
fn h2_with_java(java: &str) -> ConfiguredLauncher {
    ConfiguredLauncher::H2(H2Launcher {
        java: PathBuf::from(java),
        classpath: PathBuf::from("h2.jar"),
    })
}

fn no_shutdown_launcher() -> ConfiguredLauncher {
    ConfiguredLauncher::Command(CommandLauncher::new("dbserver", ["--port", "{port}"]))
}

fn stop_args(data_dir: &Path) -> StopArgs {
    StopArgs {
        port: None,
        data_dir: Some(data_dir.to_path_buf()),
    }
}

/// Leave a lock file behind as a crashed `h2ctl run` would.
fn leave_lock(data_dir: &Path, server_pid: Option<u32>) {
    let mut lock = ServerLock::acquire(
        data_dir,
        LockRecord {
            owner_pid: u32::MAX,
            server_pid: None,
            host: "127.0.0.1".to_string(),
            port: 9092,
            started_at: "2024-01-01T00:00:00Z".to_string(),
        },
    )
    .unwrap();
    if let Some(pid) = server_pid {
        lock.set_server_pid(pid).unwrap();
    }
    std::mem::forget(lock);
}

/// **VALUE**: Verifies `stop` on a clean data directory is a successful no-op.
#[tokio::test]
async fn given_empty_data_dir_when_stopping_then_succeeds() {
    let dir = TempDir::new().unwrap();
    let config = config_with_launcher(no_shutdown_launcher(), dir.path());

    let result = stop::execute(&config, &stop_args(dir.path())).await;

    assert!(matches!(result, Ok(code) if code == ExitCode::SUCCESS));
}

/// **VALUE**: Verifies `stop` reports a mistyped data directory instead of succeeding.
///
/// **BUG THIS CATCHES**: Would catch a typo in `--data-dir` leaving a server running while
/// the build believes it was stopped.
#[tokio::test]
async fn given_missing_data_dir_when_stopping_then_returns_directory_not_found() {
    let missing = Path::new("/definitely/not/a/data/dir");
    let config = config_with_launcher(no_shutdown_launcher(), missing);

    let result = stop::execute(&config, &stop_args(missing)).await;

    assert!(matches!(
        result,
        Err(H2ctlError::Core(CoreError::Config(ConfigError::DirectoryNotFound { .. })))
    ));
}

/// **VALUE**: Verifies a successful shutdown command is enough to stop a server.
///
/// **WHY THIS MATTERS**: H2 servers started by other tools leave no lock file; `-tcpShutdown`
/// is the only way to reach them.
///
/// **BUG THIS CATCHES**: Would catch `stop` ignoring the launcher's shutdown command, or
/// leaving a stale lock behind after the server acknowledged.
#[tokio::test]
async fn given_shutdown_command_succeeds_when_stopping_then_clears_lock() {
    // GIVEN: A shutdown command that succeeds and a lock left by a dead server
    let dir = TempDir::new().unwrap();
    leave_lock(dir.path(), None);
    let config = config_with_launcher(h2_with_java("true"), dir.path());

    // WHEN
    let result = stop::execute(&config, &stop_args(dir.path())).await;

    // THEN
    assert!(matches!(result, Ok(code) if code == ExitCode::SUCCESS));
    assert!(!lock_path(dir.path()).exists());
}

/// **VALUE**: Verifies a failing shutdown command falls back to the recorded PID.
///
/// **WHY THIS MATTERS**: A wrong TCP password makes `-tcpShutdown` fail; the server must
/// still go down.
///
/// **BUG THIS CATCHES**: Would catch `stop` giving up after the shutdown command fails.
#[tokio::test]
async fn given_shutdown_command_fails_when_stopping_then_signals_recorded_pid() {
    // GIVEN: A failing shutdown command and a lock naming a live process
    let dir = TempDir::new().unwrap();
    let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
    leave_lock(dir.path(), Some(child.id()));
    let config = config_with_launcher(h2_with_java("false"), dir.path());

    // WHEN
    let result = stop::execute(&config, &stop_args(dir.path())).await;

    // THEN: The recorded process was terminated and the lock removed
    assert!(matches!(result, Ok(code) if code == ExitCode::SUCCESS));
    assert!(child.try_wait().unwrap().is_some(), "recorded server still running");
    assert!(!lock_path(dir.path()).exists());
}
