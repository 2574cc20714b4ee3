//! Error types for the exchange crate.

use thiserror::Error;

/// Errors from exchanger operations.
///
/// Every operation is expected to be retriable; the pool layer treats
/// transient errors as "try the next replica".
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The named object does not exist.
    #[error("object not found: {0}")]
    NotExist(String),

    /// The store rejected the credentials or the operation.
    #[error("permission denied: {0}")]
    Permission(String),

    /// A transport URL could not be parsed or names an unknown scheme.
    #[error("invalid transport url: {0}")]
    InvalidUrl(String),

    /// Any other storage or network failure.
    #[error("storage error: {0}")]
    Io(String),
}

impl From<object_store::Error> for ExchangeError {
    fn from(e: object_store::Error) -> Self {
        match e {
            object_store::Error::NotFound { path, .. } => ExchangeError::NotExist(path),
            object_store::Error::PermissionDenied { path, .. } => ExchangeError::Permission(path),
            other => ExchangeError::Io(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ExchangeError {
    fn from(e: std::io::Error) -> Self {
        ExchangeError::Io(e.to_string())
    }
}

/// Result type for exchanger operations.
pub type Result<T> = std::result::Result<T, ExchangeError>;
