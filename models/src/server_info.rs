use crate::StorageMode;

use std::path::PathBuf;

use serde::Serialize;

/// Snapshot of a server owned by a lifecycle manager.
///
/// Safe to log and serialize; it never carries credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub pid: u32,
    pub host: String,
    pub port: u16,
    pub web_port: Option<u16>,
    pub data_dir: PathBuf,
    pub mode: StorageMode,
    pub command: String,
    /// Endpoint the server printed once it was listening, if it printed one.
    pub announced_url: Option<String>,
    pub ready: bool,
}
