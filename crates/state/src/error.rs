//! State store error types

use std::io;
use thiserror::Error;

/// Errors raised by the persisted marker store
#[derive(Debug, Error)]
pub enum StateError {
    /// Failed to read or write the status file
    #[error("status file '{path}': {source}")]
    Io {
        /// Path of the status file
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Status file held malformed JSON
    #[error("malformed status file '{path}': {source}")]
    Malformed {
        /// Path of the status file
        path: String,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}
