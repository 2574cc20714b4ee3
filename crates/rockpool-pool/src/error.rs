//! Error types for the pool crate.

use thiserror::Error;

/// Errors from pool operations.
///
/// User/input errors (`InvalidConfig`, `InvalidSignature`, `NotAuthorized`)
/// surface to the caller and are not retried. Transport errors are
/// recovered by trying the next replica and surface only when every
/// replica fails.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A config failed validation (empty name, no transports).
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A head or token signature did not verify.
    #[error("invalid signature")]
    InvalidSignature,

    /// The caller (or a head author) lacks the required access level.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// A required object is missing from every replica.
    #[error("not found: {0}")]
    NotExist(String),

    /// A body did not match its declared digest on any replica.
    #[error("corrupt body for head {0}")]
    Corrupt(u64),

    /// A transport operation failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// A transport operation exceeded its time budget.
    #[error("timeout: {0}")]
    Timeout(String),

    /// No configured replica is reachable.
    #[error("no reachable replica: {0}")]
    Unreachable(String),

    /// An access change cannot be applied (stale admin, last-admin guard).
    /// Dropped silently during sync; never surfaced from there.
    #[error("conflicting access change: {0}")]
    Conflict(String),

    /// The operation was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Local cache failure; the cache is critical infrastructure.
    #[error(transparent)]
    Cache(#[from] rockpool_cache::CacheError),

    /// Invariant violation; fatal for the operation, the pool stays open.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PoolError {
    /// The string-tagged kind exposed through the public API.
    pub fn kind(&self) -> &'static str {
        match self {
            PoolError::InvalidConfig(_) => "InvalidConfig",
            PoolError::InvalidSignature => "InvalidSignature",
            PoolError::NotAuthorized(_) => "NotAuthorized",
            PoolError::NotExist(_) => "NotExist",
            PoolError::Corrupt(_) => "Corrupt",
            PoolError::Io(_) => "Io",
            PoolError::Timeout(_) => "Timeout",
            PoolError::Unreachable(_) => "Unreachable",
            PoolError::Conflict(_) => "Conflict",
            PoolError::Cancelled => "Cancelled",
            PoolError::Cache(_) => "Io",
            PoolError::Internal(_) => "Internal",
        }
    }
}

impl From<rockpool_core::CoreError> for PoolError {
    fn from(e: rockpool_core::CoreError) -> Self {
        use rockpool_core::CoreError;
        match e {
            CoreError::InvalidSignature | CoreError::InvalidPublicKey => {
                PoolError::InvalidSignature
            }
            other => PoolError::Internal(other.to_string()),
        }
    }
}

impl From<rockpool_exchange::ExchangeError> for PoolError {
    fn from(e: rockpool_exchange::ExchangeError) -> Self {
        use rockpool_exchange::ExchangeError;
        match e {
            ExchangeError::NotExist(name) => PoolError::NotExist(name),
            other => PoolError::Io(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for PoolError {
    fn from(e: serde_json::Error) -> Self {
        PoolError::Internal(e.to_string())
    }
}

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
