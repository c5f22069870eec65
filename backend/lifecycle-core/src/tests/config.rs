use crate::config::paths::PathSource;
use crate::config::{ENV_DATA_DIR, ENV_MODE, ENV_PASSWORD, ENV_READY_TIMEOUT, ENV_TCP_PORT, ENV_USER, ENV_WEB_PORT, LifecycleConfig};
use crate::error::ConfigError;
use crate::launcher::ConfiguredLauncher;

use models::StorageMode;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;

fn origin() -> &'static Path {
    Path::new("h2.toml")
}

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name: &str| vars.get(name).cloned()
}

/// **VALUE**: Verifies a full config file maps onto a server config.
///
/// **WHY THIS MATTERS**: The TOML file is the only interface most build scripts touch.
///
/// **BUG THIS CATCHES**: Would catch renamed keys silently falling back to defaults.
#[test]
fn given_full_toml_when_parsed_then_builds_server_config() {
    // GIVEN
    let toml = r#"
        version = 1

        [server]
        host = "0.0.0.0"
        tcp_port = 19092
        web_port = 18082
        data_dir = "/var/lib/h2"
        mode = "inmemory"
        user = "sa"
        password = "secret"

        [launcher]
        kind = "h2"
        java = "/usr/lib/jvm/bin/java"
        classpath = "/opt/h2/h2.jar"

        [timeouts]
        ready = "45s"
        stop_grace = "2s"
        port_release = "750ms"
    "#;

    // WHEN
    let config = LifecycleConfig::from_toml_str(toml, origin()).unwrap();
    let server = config.server_config().unwrap();

    // THEN
    assert_eq!(server.host, "0.0.0.0");
    assert_eq!(server.port, 19092);
    assert_eq!(server.web_port, Some(18082));
    assert_eq!(server.data_dir, Path::new("/var/lib/h2"));
    assert_eq!(server.mode, StorageMode::InMemory);
    assert_eq!(server.tcp_password(), "secret");
    assert_eq!(config.ready_timeout().unwrap(), Duration::from_secs(45));

    let options = config.manager_options().unwrap();
    assert_eq!(options.stop_grace, Duration::from_secs(2));
    assert_eq!(options.port_release_grace, Duration::from_millis(750));
    assert!(matches!(config.launcher, ConfiguredLauncher::H2(_)));
}

/// **VALUE**: Verifies an empty file means all defaults.
#[test]
fn given_empty_toml_when_parsed_then_uses_defaults() {
    let config = LifecycleConfig::from_toml_str("", origin()).unwrap();

    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.tcp_port, 9092);
    assert_eq!(config.server.mode, StorageMode::File);
    assert_eq!(config.ready_timeout().unwrap(), Duration::from_secs(20));
}

/// **VALUE**: Verifies the web console is on by default at 8082 and can be switched off.
///
/// **WHY THIS MATTERS**: H2's console is how developers look into a test database; a
/// plain `h2ctl run` should offer it the way the H2 tooling always has.
///
/// **BUG THIS CATCHES**: Would catch the default port constant going unused again, or
/// `web_console = false` still passing `-web` to the server.
#[test]
fn given_web_console_settings_when_building_server_config_then_web_port_follows() {
    // GIVEN
    let defaults = LifecycleConfig::from_toml_str("", origin()).unwrap();
    let disabled =
        LifecycleConfig::from_toml_str("[server]\nweb_console = false", origin()).unwrap();

    // WHEN
    let default_server = defaults.server_config().unwrap();
    let disabled_server = disabled.server_config().unwrap();

    // THEN
    assert_eq!(defaults.server.web_port, 8082);
    assert_eq!(default_server.web_port, Some(8082));
    assert_eq!(disabled_server.web_port, None);
}

/// **VALUE**: Verifies a missing config file falls back to defaults instead of failing.
///
/// **WHY THIS MATTERS**: `h2ctl run` with no config file should just work on a dev box.
#[test]
fn given_missing_file_when_loading_then_returns_defaults() {
    let dir = TempDir::new().unwrap();

    let config = LifecycleConfig::load(&dir.path().join("h2.toml")).unwrap();

    assert_eq!(config.server.tcp_port, 9092);
}

/// **VALUE**: Verifies syntax errors name the file.
///
/// **BUG THIS CATCHES**: Would catch parse errors losing the path, leaving users guessing
/// which of several config files is broken.
#[test]
fn given_malformed_file_when_loading_then_returns_parse_error_with_path() {
    // GIVEN
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("h2.toml");
    std::fs::write(&path, "[server\ntcp_port = ").unwrap();

    // WHEN
    let result = LifecycleConfig::load(&path);

    // THEN
    match result {
        Err(ConfigError::ParseError { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("Expected ParseError, got {other:?}"),
    }
}

/// **VALUE**: Verifies model invariants are enforced at load time.
///
/// **BUG THIS CATCHES**: Would catch a web port colliding with the TCP port slipping through
/// until the server is already half started.
#[test]
fn given_colliding_ports_when_parsed_then_returns_validation_error() {
    let toml = r#"
        [server]
        tcp_port = 9092
        web_port = 9092
    "#;

    let result = LifecycleConfig::from_toml_str(toml, origin());

    assert!(matches!(result, Err(ConfigError::ValidationError { .. })));
}

/// **VALUE**: Verifies bad durations and versions are rejected.
#[test]
fn given_invalid_duration_or_version_when_parsed_then_returns_validation_error() {
    for toml in [
        "[timeouts]\nready = \"soon\"",
        "version = 2",
        "version = 0",
        "[server]\npassword = \"orphan\"",
    ] {
        let result = LifecycleConfig::from_toml_str(toml, origin());
        assert!(
            matches!(result, Err(ConfigError::ValidationError { .. })),
            "toml {toml:?} gave {result:?}"
        );
    }
}

/// **VALUE**: Verifies environment overrides win over the file.
///
/// **WHY THIS MATTERS**: CI runners pick ports per job through `H2_TCP_PORT`.
///
/// **BUG THIS CATCHES**: Would catch an override being read but not applied.
#[test]
fn given_overrides_when_applied_then_replace_file_values() {
    // GIVEN
    let mut config = LifecycleConfig::default();
    let vars = lookup(&[
        (ENV_TCP_PORT, "29092"),
        (ENV_WEB_PORT, "28082"),
        (ENV_DATA_DIR, "/tmp/h2-override"),
        (ENV_MODE, "memory"),
        (ENV_USER, "ci"),
        (ENV_PASSWORD, "from-env"),
        (ENV_READY_TIMEOUT, "3s"),
    ]);

    // WHEN
    config.apply_overrides(vars).unwrap();
    let server = config.server_config().unwrap();

    // THEN
    assert_eq!(server.port, 29092);
    assert_eq!(server.web_port, Some(28082));
    assert_eq!(server.data_dir, Path::new("/tmp/h2-override"));
    assert_eq!(server.mode, StorageMode::InMemory);
    assert_eq!(server.credentials.as_ref().map(|c| c.user.as_str()), Some("ci"));
    assert_eq!(server.tcp_password(), "from-env");
    assert_eq!(config.ready_timeout().unwrap(), Duration::from_secs(3));
}

/// **VALUE**: Verifies an empty `H2_WEB_PORT` disables the console.
#[test]
fn given_empty_web_port_override_when_applied_then_disables_console() {
    let mut config = LifecycleConfig::default();
    config.server.data_dir = Some("/tmp/h2-web".into());

    config.apply_overrides(lookup(&[(ENV_WEB_PORT, "")])).unwrap();

    assert!(!config.server.web_console);
    assert_eq!(config.server_config().unwrap().web_port, None);
}

/// **VALUE**: Verifies malformed overrides are reported with the variable name.
#[test]
fn given_invalid_override_when_applied_then_returns_override_error() {
    for (name, value) in [(ENV_TCP_PORT, "ninety"), (ENV_MODE, "tape")] {
        let mut config = LifecycleConfig::default();

        let result = config.apply_overrides(lookup(&[(name, value)]));

        match result {
            Err(ConfigError::OverrideError { variable, .. }) => assert_eq!(variable, name),
            other => panic!("Expected OverrideError for {name}, got {other:?}"),
        }
    }
}

/// **VALUE**: Verifies a user without password falls back to H2's default TCP password.
#[test]
fn given_user_without_password_when_building_then_uses_default_password() {
    let mut config = LifecycleConfig::default();
    config.server.user = Some("sa".to_string());
    config.server.data_dir = Some("/tmp/h2-user".into());

    let server = config.server_config().unwrap();

    assert_eq!(server.tcp_password(), "default");
}

/// **VALUE**: Verifies the password never appears when the config is echoed back.
///
/// **BUG THIS CATCHES**: Would catch `skip_serializing` being dropped from the field.
#[test]
fn given_password_when_serialized_to_toml_then_is_omitted() {
    let mut config = LifecycleConfig::default();
    config.server.user = Some("sa".to_string());
    config.server.password = Some(common::RedactedPassword::new("topsecret"));

    let rendered = toml::to_string(&config).unwrap();

    assert!(!rendered.contains("topsecret"));
    assert!(rendered.contains("sa"));
}

/// **VALUE**: Verifies the data directory reports where it came from.
#[test]
fn given_configured_and_default_data_dir_when_resolved_then_reports_source() {
    let mut config = LifecycleConfig::default();

    let (_, default_source) = config.data_dir_with_source();
    config.server.data_dir = Some("/srv/h2".into());
    let (dir, configured_source) = config.data_dir_with_source();

    assert_ne!(default_source, PathSource::Configured);
    assert_eq!(configured_source, PathSource::Configured);
    assert_eq!(dir, Path::new("/srv/h2"));
}
