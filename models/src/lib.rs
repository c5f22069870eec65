//! Domain models for the database lifecycle.
//!
//! Pure data structures describing which server to run and what is running.
//! Models carry validation but no process or network logic; that lives in
//! `lifecycle-core`.

pub mod error;
pub mod server_config;
pub mod server_info;

pub use common::ErrorLocation;
pub use error::model_error::ModelError;
pub use server_config::builder::ServerConfigBuilder;
pub use server_config::{Credentials, ServerConfig, StorageMode};
pub use server_info::ServerInfo;
