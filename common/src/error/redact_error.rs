use crate::ErrorLocation;

use thiserror::Error as ThisError;

/// Raised when something tries to write a secret wrapper back out.
#[derive(Debug, ThisError)]
pub enum RedactError {
    #[error("Secret Serialization Error: {secret} refuses to serialize, {hint} {location}")]
    SecretSerialization {
        secret: &'static str,
        hint: &'static str,
        location: ErrorLocation,
    },
}
