pub mod config;
pub mod lifecycle;

pub use config::ConfigError;
pub use lifecycle::LifecycleError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Lifecycle(#[from] lifecycle::LifecycleError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}
