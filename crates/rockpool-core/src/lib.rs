//! # Rockpool Core
//!
//! Pure primitives for rockpool: identities, crypto, signed heads, and
//! monotone id allocation.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over cryptographic data structures.
//!
//! ## Key Types
//!
//! - [`Identity`] / [`LocalIdentity`] - long-lived signing + key-agreement keypairs
//! - [`Head`] - the atomic published unit of a pool: a signed log entry
//! - [`Blake3Hash`] - content digest used as body fingerprint
//! - [`Snowflake`] - monotone 64-bit time-embedded id allocator
//!
//! ## Canonicalization
//!
//! Heads are signed over their canonical JSON serialization. See [`canonical`].

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod head;
pub mod identity;
pub mod snowflake;

pub use canonical::Base64Bytes;
pub use crypto::{
    decrypt_block, encrypt_block, generate_bytes_key, Blake3Hash, BlockKey, BlockNonce,
    Ed25519Signature,
};
pub use error::{CoreError, Result};
pub use head::{Head, HeadBuilder};
pub use identity::{ec_encrypt, Ed25519PublicKey, Identity, LocalIdentity, X25519PublicKey};
pub use snowflake::{CounterSource, IdSource, Snowflake};

/// Get current time in milliseconds since the Unix epoch.
pub fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time went backwards")
        .as_millis() as i64
}
