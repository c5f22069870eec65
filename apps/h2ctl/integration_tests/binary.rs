use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

// ============================================================================
// The h2ctl binary as a build script sees it: exit codes and stdout
// ============================================================================

fn h2ctl(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_h2ctl"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("H2_HOST")
        .env_remove("H2_TCP_PORT")
        .env_remove("H2_WEB_PORT")
        .env_remove("H2_DATA_DIR")
        .output()
        .expect("h2ctl binary should run")
}

fn free_port() -> u16 {
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    listener.local_addr().unwrap().port()
}

/// `stub-db-server` from lifecycle-core, built next to `h2ctl` in the workspace target dir.
fn stub_db_server() -> PathBuf {
    let path = Path::new(env!("CARGO_BIN_EXE_h2ctl"))
        .with_file_name(format!("stub-db-server{}", std::env::consts::EXE_SUFFIX));
    assert!(
        path.exists(),
        "{} missing; build the whole workspace so lifecycle-core's binaries exist",
        path.display()
    );
    path
}

/// **VALUE**: Verifies `h2ctl config` prints the file's values as TOML.
#[test]
fn given_config_file_when_running_config_command_then_prints_effective_values() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("h2.toml");
    std::fs::write(
        &config,
        "[server]\ntcp_port = 19099\nuser = \"sa\"\npassword = \"never-print-me\"\n",
    )
    .unwrap();

    // WHEN
    let output = h2ctl(&config, &["config"]);

    // THEN
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("tcp_port = 19099"));
    assert!(!stdout.contains("never-print-me"));
}

/// **VALUE**: Verifies a broken config file fails the process.
///
/// **WHY THIS MATTERS**: Build tools only look at the exit code.
#[test]
fn given_invalid_config_file_when_running_then_exits_with_failure() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("h2.toml");
    std::fs::write(&config, "[server]\ntcp_port = \"not a port\"\n").unwrap();

    let output = h2ctl(&config, &["config"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Config Parse Error"));
}

/// **VALUE**: Verifies `h2ctl check` exit codes for an open and a closed port.
#[test]
fn given_ports_when_running_check_then_exit_code_reflects_readiness() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("missing.toml");
    let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
    let open_port = listener.local_addr().unwrap().port().to_string();
    let closed_port = {
        let probe = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        probe.local_addr().unwrap().port().to_string()
    };

    // WHEN
    let open = h2ctl(&config, &["check", "--port", &open_port, "--timeout", "2s"]);
    let closed = h2ctl(&config, &["check", "--port", &closed_port, "--timeout", "300ms"]);

    // THEN
    assert!(open.status.success());
    assert!(!closed.status.success());
    assert!(String::from_utf8_lossy(&closed.stderr).contains("Readiness Timeout Error"));
}

/// **VALUE**: Verifies `h2ctl stop` with nothing recorded is a success.
#[test]
fn given_clean_data_dir_when_running_stop_then_succeeds() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("h2.toml");
    std::fs::write(
        &config,
        "[launcher]\nkind = \"command\"\nprogram = \"dbserver\"\n",
    )
    .unwrap();
    let data_dir = dir.path().to_string_lossy().to_string();

    let output = h2ctl(&config, &["stop", "--data-dir", &data_dir]);

    assert!(output.status.success());
}

/// **VALUE**: Verifies `h2ctl run` fails cleanly when the server can't be spawned.
///
/// **BUG THIS CATCHES**: Would catch a spawn failure leaving a lock file behind.
#[test]
fn given_missing_server_program_when_running_then_fails_without_lock() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    let config = dir.path().join("h2.toml");
    let port = {
        let probe = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        probe.local_addr().unwrap().port()
    };
    std::fs::write(
        &config,
        format!(
            "[server]\ntcp_port = {port}\nweb_console = false\ndata_dir = {:?}\n\n[launcher]\nkind = \"command\"\nprogram = \"/nonexistent/db-server\"\n",
            data_dir.to_string_lossy()
        ),
    )
    .unwrap();

    // WHEN
    let output = h2ctl(&config, &["run", "--", "true"]);

    // THEN
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Spawn Error"));
    assert!(!data_dir.join("h2-lifecycle.lock").exists());
}

/// **VALUE**: Verifies `h2ctl run -- <cmd>` end to end: the wrapped command sees the
/// server's coordinates, its exit code becomes h2ctl's, and the server is cleaned up.
///
/// **WHY THIS MATTERS**: This is how build scripts use h2ctl: `h2ctl run -- ./gradlew test`.
/// A swallowed exit code turns failing test suites green.
///
/// **BUG THIS CATCHES**: Would catch missing `H2_*` variables, the exit code being replaced
/// by h2ctl's own, or a lock file left behind after the run.
#[test]
fn given_wrapped_command_when_running_then_exit_code_and_env_follow_the_command() {
    // GIVEN: A stub server on free ports and a command that checks its environment
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    let config = dir.path().join("h2.toml");
    let port = free_port();
    let web_port = std::iter::repeat_with(free_port)
        .find(|&p| p != port)
        .unwrap();
    std::fs::write(
        &config,
        format!(
            "[server]\ntcp_port = {port}\nweb_port = {web_port}\ndata_dir = {:?}\n\n\
             [launcher]\nkind = \"command\"\nprogram = {:?}\nargs = [\"--host\", \"{{host}}\", \"--port\", \"{{port}}\"]\n",
            data_dir.to_string_lossy(),
            stub_db_server().to_string_lossy()
        ),
    )
    .unwrap();
    let script = format!(
        "test -n \"$H2_TCP_URL\" && test \"$H2_HOST\" = 127.0.0.1 \
         && test \"$H2_TCP_PORT\" = {port} && test \"$H2_WEB_PORT\" = {web_port} && exit 3"
    );

    // WHEN
    let output = h2ctl(&config, &["run", "--", "sh", "-c", &script]);

    // THEN
    assert_eq!(
        output.status.code(),
        Some(3),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(!data_dir.join("h2-lifecycle.lock").exists());
    assert!(TcpListener::bind(("127.0.0.1", port)).is_ok(), "server still holds its port");
}
