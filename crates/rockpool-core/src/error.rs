//! Error types for the core crate.

use thiserror::Error;

/// Errors from identity, crypto, and head operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A signature did not verify against the claimed author.
    #[error("invalid signature")]
    InvalidSignature,

    /// Public key bytes do not form a valid key.
    #[error("invalid public key")]
    InvalidPublicKey,

    /// An identity id could not be decoded back into its key pair.
    #[error("invalid identity id: {0}")]
    InvalidIdentityId(String),

    /// Symmetric or envelope encryption failed.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Symmetric or envelope decryption failed (wrong key, tampered data).
    #[error("decryption error: {0}")]
    Decryption(String),

    /// A sealed envelope is too short to contain its framing.
    #[error("sealed envelope too short: {0} bytes")]
    SealedTooShort(usize),

    /// JSON serialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        CoreError::Serialization(e.to_string())
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
