//! Common error types for FBK

use thiserror::Error;

/// Common result type for FBK operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the FBK crates
#[derive(Error, Debug)]
pub enum Error {
    /// Transport-level HTTP failure (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("Backend error ({status}): {message}")]
    Backend {
        /// HTTP status code returned by the backend
        status: u16,
        /// Response body or reason phrase
        message: String,
    },

    /// Payload could not be decoded into the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No signed-in user for an operation that requires one
    #[error("Not signed in: {0}")]
    Unauthenticated(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether retrying the same request might succeed
    ///
    /// Transport failures, timeouts and 5xx/429 responses are transient.
    /// Client errors and decode failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(_) | Error::Io(_) => true,
            Error::Backend { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}
