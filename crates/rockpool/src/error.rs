//! Public API error type.
//!
//! Every error carries a string-tagged kind so embedders can switch on a
//! stable name instead of a Rust enum.

use thiserror::Error;

/// Errors surfaced by the public API.
#[derive(Debug, Error)]
pub enum Error {
    /// The session is not started (or was stopped).
    #[error("rockpool is not started")]
    NotStarted,

    #[error(transparent)]
    Pool(#[from] rockpool_pool::PoolError),

    #[error(transparent)]
    Invite(#[from] rockpool_invite::InviteError),

    #[error(transparent)]
    Cache(#[from] rockpool_cache::CacheError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable string-tagged kind, e.g. `"InvalidConfig"` or `"Timeout"`.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotStarted => "Internal",
            Error::Pool(e) => e.kind(),
            Error::Invite(e) => e.kind(),
            Error::Cache(_) => "Io",
            Error::Internal(_) => "Internal",
        }
    }
}

impl From<rockpool_core::CoreError> for Error {
    fn from(e: rockpool_core::CoreError) -> Self {
        Error::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(e.to_string())
    }
}

/// Result type for the public API.
pub type Result<T> = std::result::Result<T, Error>;
