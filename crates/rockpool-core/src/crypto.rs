//! Cryptographic primitives: Blake3 hashing, Ed25519 signatures, and the
//! authenticated block cipher used by invite tokens and envelopes.
//!
//! The block cipher is AES-256-GCM instantiated with a 16-byte nonce, the
//! nonce size the invite wire format carries.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::AesGcm;
use rand::RngCore;
use std::fmt;

use crate::canonical::b64;
use crate::error::{CoreError, Result};

/// AES-256-GCM with a 16-byte nonce.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// A 32-byte Blake3 hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Blake3Hash(pub [u8; 32]);

impl Blake3Hash {
    /// Compute the Blake3 hash of the given data.
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The zero hash (sentinel value).
    pub const ZERO: Self = Self([0u8; 32]);
}

impl fmt::Debug for Blake3Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blake3({})", &self.to_hex()[..16])
    }
}

impl AsRef<[u8]> for Blake3Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl serde::Serialize for Blake3Hash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        b64::serialize_fixed(&self.0, serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Blake3Hash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Self(b64::deserialize_fixed(deserializer)?))
    }
}

/// A 64-byte Ed25519 signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Ed25519Signature(pub [u8; 64]);

impl Ed25519Signature {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    /// The zero signature (invalid, used as placeholder).
    pub const ZERO: Self = Self([0u8; 64]);
}

impl fmt::Debug for Ed25519Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Sig({}...)", &hex::encode(&self.0[..8]))
    }
}

impl serde::Serialize for Ed25519Signature {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        b64::serialize_fixed(&self.0, serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Ed25519Signature {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Ok(Self(b64::deserialize_fixed(deserializer)?))
    }
}

/// A 256-bit key for the block cipher.
#[derive(Clone)]
pub struct BlockKey([u8; 32]);

impl BlockKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Create from a variable-length slice (must be 32 bytes).
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::Decryption(format!("invalid key length: {}", bytes.len())))?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// A 16-byte nonce for the block cipher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockNonce(pub [u8; 16]);

impl BlockNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Create from a variable-length slice (must be 16 bytes).
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| CoreError::Decryption(format!("invalid nonce length: {}", bytes.len())))?;
        Ok(Self(arr))
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

/// Encrypt a block of data with the authenticated cipher.
pub fn encrypt_block(key: &BlockKey, nonce: &BlockNonce, plain: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
        .map_err(|e| CoreError::Encryption(e.to_string()))?;
    cipher
        .encrypt(GenericArray::from_slice(nonce.as_bytes()), plain)
        .map_err(|e| CoreError::Encryption(e.to_string()))
}

/// Decrypt a block of data with the authenticated cipher.
pub fn decrypt_block(key: &BlockKey, nonce: &BlockNonce, cipher_text: &[u8]) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm16::new_from_slice(key.as_bytes())
        .map_err(|e| CoreError::Decryption(e.to_string()))?;
    cipher
        .decrypt(GenericArray::from_slice(nonce.as_bytes()), cipher_text)
        .map_err(|e| CoreError::Decryption(e.to_string()))
}

/// Generate `n` cryptographically strong random bytes.
pub fn generate_bytes_key(n: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; n];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blake3_hash() {
        let h1 = Blake3Hash::hash(b"test data");
        let h2 = Blake3Hash::hash(b"test data");
        assert_eq!(h1, h2);

        let h3 = Blake3Hash::hash(b"different data");
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_block_cipher_roundtrip() {
        let key = BlockKey::generate();
        let nonce = BlockNonce::generate();
        let plain = b"hello, encrypted world!";

        let cipher = encrypt_block(&key, &nonce, plain).unwrap();
        assert_ne!(cipher.as_slice(), plain.as_slice());

        let decrypted = decrypt_block(&key, &nonce, &cipher).unwrap();
        assert_eq!(decrypted, plain);
    }

    #[test]
    fn test_block_cipher_wrong_key_fails() {
        let key1 = BlockKey::generate();
        let key2 = BlockKey::generate();
        let nonce = BlockNonce::generate();

        let cipher = encrypt_block(&key1, &nonce, b"secret").unwrap();
        assert!(decrypt_block(&key2, &nonce, &cipher).is_err());
    }

    #[test]
    fn test_block_cipher_tampered_fails() {
        let key = BlockKey::generate();
        let nonce = BlockNonce::generate();

        let mut cipher = encrypt_block(&key, &nonce, b"secret").unwrap();
        cipher[0] ^= 0x01;
        assert!(decrypt_block(&key, &nonce, &cipher).is_err());
    }

    #[test]
    fn test_generate_bytes_key() {
        let a = generate_bytes_key(32);
        let b = generate_bytes_key(32);
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_json_roundtrip() {
        let h = Blake3Hash::hash(b"payload");
        let json = serde_json::to_string(&h).unwrap();
        let back: Blake3Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
    }
}
