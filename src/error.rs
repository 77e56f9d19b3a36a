//! Error types for msgloop
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can abort a worker run
#[derive(Debug, Error)]
pub enum WorkerError {
    /// A present option failed its type or positivity constraint
    #[error("Option \"{option}\" must be a positive integer, \"{value}\" passed.")]
    InvalidOption { option: String, value: String },

    /// A configured receiver name has no handle in the locator
    #[error("The receiver \"{name}\" does not exist. Valid receivers are: {}.", valid.join(", "))]
    UnknownReceiver { name: String, valid: Vec<String> },

    /// The `bus` option names a bus the router does not know
    #[error("The bus \"{name}\" does not exist. Valid buses are: {}.", valid.join(", "))]
    UnknownBus { name: String, valid: Vec<String> },

    /// The restart signal store could not be read or written
    #[error("Restart signal store unavailable: {0}")]
    StoreUnavailable(String),

    /// A receiver failed to fetch, ack or reject
    #[error("Receiver error: {0}")]
    Receiver(String),

    /// Queue transport error
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for worker operations
pub type Result<T> = std::result::Result<T, WorkerError>;
