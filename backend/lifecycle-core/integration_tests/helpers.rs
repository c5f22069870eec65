//! Test helpers for lifecycle integration tests.
//!
//! Servers are played by the `stub-db-server` binary built alongside these
//! tests, so no JVM or H2 jar is needed.

use lifecycle_core::port::allocate_port;
use lifecycle_core::{CommandLauncher, LifecycleManager, ManagerOptions};

use models::{ServerConfig, ServerConfigBuilder};

use std::path::Path;
use std::time::Duration;

pub const LOCALHOST: &str = "127.0.0.1";
pub const READY_TIMEOUT: Duration = Duration::from_secs(10);

pub fn stub_program() -> &'static str {
    env!("CARGO_BIN_EXE_stub-db-server")
}

/// Launcher for a stub that listens immediately.
pub fn stub_launcher() -> CommandLauncher {
    stub_launcher_with(&[])
}

/// Launcher for a stub with extra flags, e.g. `--listen-after-ms`.
pub fn stub_launcher_with(extra: &[&str]) -> CommandLauncher {
    let mut args = vec!["--host", "{host}", "--port", "{port}"];
    args.extend_from_slice(extra);
    CommandLauncher::new(stub_program(), args)
}

pub fn fast_options() -> ManagerOptions {
    ManagerOptions {
        stop_grace: Duration::from_secs(2),
        port_release_grace: Duration::from_secs(2),
    }
}

pub fn manager(launcher: CommandLauncher) -> LifecycleManager<CommandLauncher> {
    LifecycleManager::with_options(launcher, fast_options())
}

pub fn free_port() -> u16 {
    allocate_port(LOCALHOST).expect("OS should hand out a free port")
}

pub fn stub_config(data_dir: &Path) -> ServerConfig {
    stub_config_on(free_port(), data_dir)
}

pub fn stub_config_on(port: u16, data_dir: &Path) -> ServerConfig {
    ServerConfigBuilder::default()
        .with_host(LOCALHOST)
        .with_port(port)
        .with_data_dir(data_dir)
        .build()
        .expect("test config should be valid")
}
