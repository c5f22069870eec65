use crate::ErrorLocation;

use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum ModelError {
    /// A server configuration breaks one of its invariants.
    #[error("Validation Error: {message} {location}")]
    Validation {
        message: String,
        location: ErrorLocation,
    },

    /// A storage mode name that is neither in-memory nor file.
    #[error("Unknown Storage Mode Error: '{value}' (expected inmemory or file) {location}")]
    UnknownStorageMode {
        value: String,
        location: ErrorLocation,
    },
}
