//! Platform-aware default for the database data directory.
//!
//! Lookup order:
//! 1. Platform-specific local data directory via `dirs` crate
//! 2. System temp directory

use std::env;
use std::fmt;
use std::path::PathBuf;

use log::{debug, warn};

const APP_DIR_NAME: &str = "h2-lifecycle";

/// How the default data directory was determined (for logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSource {
    /// Set explicitly in the config file or environment.
    Configured,
    /// Platform local data directory (XDG, AppData, Library).
    PlatformDefault,
    /// No platform directory; fell back to the temp directory.
    TempFallback,
}

impl fmt::Display for PathSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSource::Configured => write!(f, "configured"),
            PathSource::PlatformDefault => write!(f, "platform default"),
            PathSource::TempFallback => write!(f, "temp fallback"),
        }
    }
}

/// Default data directory when none is configured.
pub fn default_data_dir() -> (PathBuf, PathSource) {
    match dirs::data_local_dir() {
        Some(base) => {
            let path = base.join(APP_DIR_NAME).join("data");
            debug!("Default data dir from platform: {}", path.display());
            (path, PathSource::PlatformDefault)
        }
        None => {
            let path = env::temp_dir().join(APP_DIR_NAME).join("data");
            warn!(
                "No platform data directory, falling back to {}",
                path.display()
            );
            (path, PathSource::TempFallback)
        }
    }
}
