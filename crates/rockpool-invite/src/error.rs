//! Error types for the invite crate.

use thiserror::Error;

/// Errors from invite encoding, decoding, and delivery.
#[derive(Debug, Error)]
pub enum InviteError {
    /// The token wire form is malformed (wrong framing, bad base64,
    /// unparsable JSON, or an invalid carried config).
    #[error("invalid invite token: {0}")]
    InvalidToken(String),

    /// The outer token signature does not verify against the sender id.
    #[error("invalid token signature")]
    InvalidSignature,

    /// The invite is not addressed to us (no config to join with).
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// Underlying pool failure.
    #[error(transparent)]
    Pool(#[from] rockpool_pool::PoolError),

    /// Underlying cache failure.
    #[error(transparent)]
    Cache(#[from] rockpool_cache::CacheError),

    /// Crypto failure while unwrapping the master key or config block.
    #[error("crypto error: {0}")]
    Crypto(String),
}

impl InviteError {
    /// The string-tagged kind exposed through the public API.
    pub fn kind(&self) -> &'static str {
        match self {
            InviteError::InvalidToken(_) => "InvalidToken",
            InviteError::InvalidSignature => "InvalidSignature",
            InviteError::NotAuthorized(_) => "NotAuthorized",
            InviteError::Pool(e) => e.kind(),
            InviteError::Cache(_) => "Io",
            InviteError::Crypto(_) => "InvalidToken",
        }
    }
}

impl From<rockpool_core::CoreError> for InviteError {
    fn from(e: rockpool_core::CoreError) -> Self {
        use rockpool_core::CoreError;
        match e {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => {
                InviteError::InvalidSignature
            }
            other => InviteError::Crypto(other.to_string()),
        }
    }
}

/// Result type for invite operations.
pub type Result<T> = std::result::Result<T, InviteError>;
