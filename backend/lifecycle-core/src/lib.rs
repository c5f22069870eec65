pub mod config;
pub mod error;
pub mod hooks;
pub mod launcher;
pub mod lock;
pub mod manager;
pub mod port;
pub mod process;

mod output;
#[cfg(test)]
mod tests;

pub use hooks::{DatabaseSession, with_database};
pub use launcher::{CommandLauncher, ConfiguredLauncher, H2Launcher, LaunchCommand, ServerLauncher};
pub use manager::{LifecycleManager, ManagerOptions, ServerHandle};

pub const H2_MAIN_CLASS: &str = "org.h2.tools.Server";
pub const DEFAULT_JAVA: &str = "java";
pub const LOOPBACK_HOST: &str = "127.0.0.1";
pub const H2_TCP_URL_SCHEME: &str = "tcp://";
pub const H2_LOCAL_TCP_URL: &str = const_format::concatcp!(H2_TCP_URL_SCHEME, LOOPBACK_HOST);
