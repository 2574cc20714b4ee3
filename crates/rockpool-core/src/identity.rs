//! Identities: long-lived signing + key-agreement keypairs.
//!
//! The public half of an identity is two 32-byte keys and a nickname. The
//! **id** is the base64url (no padding) encoding of signing key followed by
//! key-agreement key, so an identity is always reconstructible from its id:
//! a head or token whose embedded keys do not match its claimed id never
//! verifies.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::crypto::{decrypt_block, encrypt_block, BlockKey, BlockNonce, Ed25519Signature};
use crate::error::{CoreError, Result};

/// A 32-byte Ed25519 public signing key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ed25519PublicKey(pub [u8; 32]);

impl Ed25519PublicKey {
    /// Verify a signature over a message.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<()> {
        let verifying_key =
            VerifyingKey::from_bytes(&self.0).map_err(|_| CoreError::InvalidPublicKey)?;
        let sig = Signature::from_bytes(&signature.0);
        verifying_key
            .verify(message, &sig)
            .map_err(|_| CoreError::InvalidSignature)
    }
}

impl fmt::Debug for Ed25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Pub({})", &hex::encode(&self.0[..8]))
    }
}

/// A 32-byte X25519 public key-agreement key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct X25519PublicKey(pub [u8; 32]);

impl X25519PublicKey {
    fn to_dalek(self) -> PublicKey {
        PublicKey::from(self.0)
    }
}

impl fmt::Debug for X25519PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "X25519Pub({})", &hex::encode(&self.0[..8]))
    }
}

/// The public form of a peer: two public keys plus a nickname.
///
/// Exported in heads (as the author id) and in invite tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Public signing key.
    pub sign: Ed25519PublicKey,
    /// Public key-agreement key.
    pub agree: X25519PublicKey,
    /// Optional display name, not covered by the id.
    #[serde(default)]
    pub nick: String,
}

impl Identity {
    /// The compact deterministic id: base64url(sign || agree), no padding.
    pub fn id(&self) -> String {
        let mut bytes = [0u8; 64];
        bytes[..32].copy_from_slice(&self.sign.0);
        bytes[32..].copy_from_slice(&self.agree.0);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Reconstruct an identity from its id. The nickname is left empty.
    pub fn from_id(id: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(id.as_bytes())
            .map_err(|_| CoreError::InvalidIdentityId(id.to_string()))?;
        if bytes.len() != 64 {
            return Err(CoreError::InvalidIdentityId(id.to_string()));
        }
        let mut sign = [0u8; 32];
        let mut agree = [0u8; 32];
        sign.copy_from_slice(&bytes[..32]);
        agree.copy_from_slice(&bytes[32..]);
        Ok(Self {
            sign: Ed25519PublicKey(sign),
            agree: X25519PublicKey(agree),
            nick: String::new(),
        })
    }

    /// Verify a signature made by this identity.
    pub fn verify(&self, message: &[u8], signature: &Ed25519Signature) -> Result<()> {
        self.sign.verify(message, signature)
    }
}

/// Verify a signature against a claimed identity id.
///
/// The verifying key is re-derived from the id itself, so an id that does
/// not match the signer's keys can never pass.
pub fn verify_with_id(id: &str, message: &[u8], signature: &Ed25519Signature) -> Result<()> {
    Identity::from_id(id)?.verify(message, signature)
}

/// A full identity including the private key material.
///
/// Created once on first run, persisted locally, never mutated. The secret
/// halves never leave this process.
pub struct LocalIdentity {
    signing: SigningKey,
    agreement: StaticSecret,
    nick: String,
}

impl LocalIdentity {
    /// Generate a new identity with fresh random keys.
    pub fn new(nick: impl Into<String>) -> Self {
        let mut rng = rand::thread_rng();
        let signing = SigningKey::generate(&mut rng);
        let mut agree_seed = [0u8; 32];
        rng.fill_bytes(&mut agree_seed);
        Self {
            signing,
            agreement: StaticSecret::from(agree_seed),
            nick: nick.into(),
        }
    }

    /// Restore an identity from persisted seeds.
    pub fn from_seeds(sign_seed: &[u8; 32], agree_seed: &[u8; 32], nick: impl Into<String>) -> Self {
        Self {
            signing: SigningKey::from_bytes(sign_seed),
            agreement: StaticSecret::from(*agree_seed),
            nick: nick.into(),
        }
    }

    /// The seeds to persist. Secret key material; handle accordingly.
    pub fn seeds(&self) -> ([u8; 32], [u8; 32]) {
        (self.signing.to_bytes(), self.agreement.to_bytes())
    }

    /// The public form of this identity.
    pub fn public(&self) -> Identity {
        Identity {
            sign: Ed25519PublicKey(self.signing.verifying_key().to_bytes()),
            agree: X25519PublicKey(*PublicKey::from(&self.agreement).as_bytes()),
            nick: self.nick.clone(),
        }
    }

    /// The compact id of this identity.
    pub fn id(&self) -> String {
        self.public().id()
    }

    /// The nickname.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Sign a message with the private signing key.
    pub fn sign(&self, message: &[u8]) -> Ed25519Signature {
        Ed25519Signature(self.signing.sign(message).to_bytes())
    }

    /// Open a sealed envelope addressed to this identity.
    pub fn ec_decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < 32 + 16 {
            return Err(CoreError::SealedTooShort(sealed.len()));
        }
        let mut eph = [0u8; 32];
        eph.copy_from_slice(&sealed[..32]);
        let nonce = BlockNonce::from_slice(&sealed[32..48])?;

        let shared = self.agreement.diffie_hellman(&PublicKey::from(eph));
        let self_agree = X25519PublicKey(*PublicKey::from(&self.agreement).as_bytes());
        let wrap = derive_wrap_key(shared.as_bytes(), &self_agree);
        decrypt_block(&wrap, &nonce, &sealed[48..])
    }
}

impl fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LocalIdentity({}, {:?})", self.nick, self.public().sign)
    }
}

/// Seal bytes so that only `recipient` can open them.
///
/// Ephemeral X25519 key agreement, a Blake3-derived wrap key, and the
/// authenticated block cipher. Sealed layout: `eph_pub(32) || nonce(16) ||
/// ciphertext`.
pub fn ec_encrypt(recipient: &Identity, plain: &[u8]) -> Result<Vec<u8>> {
    let ephemeral = EphemeralSecret::random_from_rng(rand::thread_rng());
    let eph_public = PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&recipient.agree.to_dalek());

    let wrap = derive_wrap_key(shared.as_bytes(), &recipient.agree);
    let nonce = BlockNonce::generate();
    let cipher_text = encrypt_block(&wrap, &nonce, plain)?;

    let mut sealed = Vec::with_capacity(32 + 16 + cipher_text.len());
    sealed.extend_from_slice(eph_public.as_bytes());
    sealed.extend_from_slice(nonce.as_bytes());
    sealed.extend_from_slice(&cipher_text);
    Ok(sealed)
}

/// Derive the envelope wrap key from an ECDH shared secret.
fn derive_wrap_key(shared: &[u8; 32], recipient_agree: &X25519PublicKey) -> BlockKey {
    let mut hasher = blake3::Hasher::new_derive_key("rockpool/ec-envelope/v1");
    hasher.update(shared);
    hasher.update(&recipient_agree.0);
    BlockKey::from_bytes(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let alice = LocalIdentity::new("alice");
        let message = b"hello world";
        let signature = alice.sign(message);

        alice
            .public()
            .verify(message, &signature)
            .expect("valid signature should verify");

        assert!(alice.public().verify(b"hello worlD", &signature).is_err());
    }

    #[test]
    fn test_id_roundtrip() {
        let alice = LocalIdentity::new("alice");
        let public = alice.public();
        let id = public.id();

        let recovered = Identity::from_id(&id).unwrap();
        assert_eq!(recovered.sign, public.sign);
        assert_eq!(recovered.agree, public.agree);
        assert_eq!(recovered.id(), id);
    }

    #[test]
    fn test_verify_with_id_rejects_foreign_id() {
        let alice = LocalIdentity::new("alice");
        let carol = LocalIdentity::new("carol");
        let message = b"payload";

        // carol signs, but the head claims alice
        let forged = carol.sign(message);
        assert!(verify_with_id(&alice.id(), message, &forged).is_err());
        verify_with_id(&carol.id(), message, &forged).unwrap();
    }

    #[test]
    fn test_invalid_id_rejected() {
        assert!(Identity::from_id("not-base64!!").is_err());
        assert!(Identity::from_id("c2hvcnQ").is_err()); // decodes, wrong length
    }

    #[test]
    fn test_ec_envelope_roundtrip() {
        let bob = LocalIdentity::new("bob");
        let sealed = ec_encrypt(&bob.public(), b"master key material").unwrap();
        let opened = bob.ec_decrypt(&sealed).unwrap();
        assert_eq!(opened, b"master key material");
    }

    #[test]
    fn test_ec_envelope_wrong_recipient_fails() {
        let bob = LocalIdentity::new("bob");
        let carol = LocalIdentity::new("carol");

        let sealed = ec_encrypt(&bob.public(), b"secret").unwrap();
        assert!(carol.ec_decrypt(&sealed).is_err());
    }

    #[test]
    fn test_ec_envelope_recipient_from_id_alone() {
        // The sender may only know the recipient's id string.
        let bob = LocalIdentity::new("bob");
        let bob_from_id = Identity::from_id(&bob.id()).unwrap();

        let sealed = ec_encrypt(&bob_from_id, b"secret").unwrap();
        assert_eq!(bob.ec_decrypt(&sealed).unwrap(), b"secret");
    }

    #[test]
    fn test_from_seeds_deterministic() {
        let alice = LocalIdentity::new("alice");
        let (sign_seed, agree_seed) = alice.seeds();
        let restored = LocalIdentity::from_seeds(&sign_seed, &agree_seed, "alice");
        assert_eq!(restored.id(), alice.id());
    }
}
