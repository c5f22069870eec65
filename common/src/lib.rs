//! Shared building blocks for the h2-lifecycle workspace.
//!
//! This crate holds the small types every other crate leans on:
//! call-site tracking for errors and a credential wrapper that never
//! leaks its value.
//!
//! ## Architecture
//!
//! - **common** (this crate): Error location tracking, redacted secrets
//! - **models**: Pure data structures (server configuration, server info)
//! - **lifecycle-core**: Starting, probing and stopping database servers
//! - **h2ctl**: Command-line wiring and logging

pub mod error;
pub mod redacted_password;

pub use error::error_location::ErrorLocation;
pub use error::redact_error::RedactError;
pub use redacted_password::RedactedPassword;

#[cfg(test)]
mod tests;
