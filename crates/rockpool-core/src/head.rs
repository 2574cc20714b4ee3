//! Head: the atomic published unit of a pool.
//!
//! A head is an immutable, signed log entry. The envelope is JSON; the
//! signature covers the JSON of all fields preceding it, in declaration
//! order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::crypto::{Blake3Hash, Ed25519Signature};
use crate::error::Result;
use crate::identity::{verify_with_id, LocalIdentity};
use crate::now_millis;

/// Arbitrary small typed key-value metadata attached to a head.
pub type Meta = BTreeMap<String, serde_json::Value>;

/// A signed log entry: envelope for a body published at `<pool>/<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Head {
    /// Monotone 64-bit sequence id (snowflake-derived).
    pub id: u64,

    /// Application-defined path within the pool, e.g. `chat/...`.
    pub name: String,

    /// Body size in bytes.
    pub size: i64,

    /// Blake3 digest of the body.
    pub hash: Blake3Hash,

    /// Last-modified time recorded at publication.
    pub mod_time: DateTime<Utc>,

    /// Compact id of the author identity.
    pub author_id: String,

    /// Author-declared creation time (Unix milliseconds). Untrusted.
    pub ctime: i64,

    /// Optional small metadata map.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,

    /// Ed25519 signature over the canonical JSON of the preceding fields.
    pub signature: Ed25519Signature,
}

/// The signed projection of a head: every field except the signature.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedFields<'a> {
    id: u64,
    name: &'a str,
    size: i64,
    hash: &'a Blake3Hash,
    mod_time: &'a DateTime<Utc>,
    author_id: &'a str,
    ctime: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta: Option<&'a Meta>,
}

impl Head {
    /// The canonical bytes covered by the signature.
    pub fn signed_bytes(&self) -> Result<Vec<u8>> {
        let fields = SignedFields {
            id: self.id,
            name: &self.name,
            size: self.size,
            hash: &self.hash,
            mod_time: &self.mod_time,
            author_id: &self.author_id,
            ctime: self.ctime,
            meta: self.meta.as_ref(),
        };
        Ok(serde_json::to_vec(&fields)?)
    }

    /// Verify the signature against the claimed author id.
    ///
    /// The verifying key is derived from `author_id` itself, so an envelope
    /// signed by anyone else cannot claim this author.
    pub fn verify(&self) -> Result<()> {
        verify_with_id(&self.author_id, &self.signed_bytes()?, &self.signature)
    }

    /// Serialize the envelope to JSON bytes.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse an envelope from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Whether this head carries an access-control change.
    pub fn is_access_change(&self) -> bool {
        self.name.starts_with("access/")
    }
}

/// Builder for creating signed heads.
pub struct HeadBuilder {
    id: u64,
    name: String,
    size: i64,
    hash: Blake3Hash,
    mod_time: DateTime<Utc>,
    ctime: i64,
    meta: Option<Meta>,
}

impl HeadBuilder {
    /// Start building a head for a body already hashed.
    pub fn new(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            size: 0,
            hash: Blake3Hash::ZERO,
            mod_time: Utc::now(),
            ctime: now_millis(),
            meta: None,
        }
    }

    /// Set the body size.
    pub fn size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }

    /// Set the body digest.
    pub fn hash(mut self, hash: Blake3Hash) -> Self {
        self.hash = hash;
        self
    }

    /// Override the modification time.
    pub fn mod_time(mut self, t: DateTime<Utc>) -> Self {
        self.mod_time = t;
        self
    }

    /// Override the author-declared creation time.
    pub fn ctime(mut self, ctime: i64) -> Self {
        self.ctime = ctime;
        self
    }

    /// Attach metadata.
    pub fn meta(mut self, meta: Meta) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Sign the head with the author's identity.
    pub fn sign(self, author: &LocalIdentity) -> Result<Head> {
        let mut head = Head {
            id: self.id,
            name: self.name,
            size: self.size,
            hash: self.hash,
            mod_time: self.mod_time,
            author_id: author.id(),
            ctime: self.ctime,
            meta: self.meta,
            signature: Ed25519Signature::ZERO,
        };
        head.signature = author.sign(&head.signed_bytes()?);
        Ok(head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::LocalIdentity;

    fn sample_head(author: &LocalIdentity) -> Head {
        HeadBuilder::new(42, "chat/m1")
            .size(5)
            .hash(Blake3Hash::hash(b"hello"))
            .ctime(1736870400000)
            .sign(author)
            .unwrap()
    }

    #[test]
    fn test_head_sign_verify() {
        let alice = LocalIdentity::new("alice");
        let head = sample_head(&alice);
        head.verify().unwrap();
        assert_eq!(head.author_id, alice.id());
    }

    #[test]
    fn test_head_json_roundtrip() {
        let alice = LocalIdentity::new("alice");
        let head = sample_head(&alice);

        let json = head.to_json().unwrap();
        let back = Head::from_json(&json).unwrap();
        assert_eq!(head, back);
        back.verify().unwrap();
    }

    #[test]
    fn test_head_envelope_field_names() {
        let alice = LocalIdentity::new("alice");
        let head = sample_head(&alice);

        let value: serde_json::Value = serde_json::from_slice(&head.to_json().unwrap()).unwrap();
        for key in ["id", "name", "size", "hash", "modTime", "authorId", "ctime", "signature"] {
            assert!(value.get(key).is_some(), "missing envelope key {key}");
        }
        assert!(value.get("meta").is_none(), "absent meta must be omitted");
    }

    #[test]
    fn test_tampered_head_rejected() {
        let alice = LocalIdentity::new("alice");
        let mut head = sample_head(&alice);
        head.size = 6;
        assert!(head.verify().is_err());
    }

    #[test]
    fn test_forged_author_rejected() {
        let alice = LocalIdentity::new("alice");
        let carol = LocalIdentity::new("carol");

        // carol signs a head that claims alice as author
        let mut head = sample_head(&carol);
        head.author_id = alice.id();
        head.signature = carol.sign(&head.signed_bytes().unwrap());
        assert!(head.verify().is_err());
    }

    #[test]
    fn test_meta_covered_by_signature() {
        let alice = LocalIdentity::new("alice");
        let mut meta = Meta::new();
        meta.insert("lamport".into(), serde_json::json!(7));

        let head = HeadBuilder::new(1, "chat/m1")
            .size(2)
            .hash(Blake3Hash::hash(b"hi"))
            .meta(meta)
            .sign(&alice)
            .unwrap();
        head.verify().unwrap();

        let mut tampered = head.clone();
        tampered
            .meta
            .as_mut()
            .unwrap()
            .insert("lamport".into(), serde_json::json!(8));
        assert!(tampered.verify().is_err());
    }

    #[test]
    fn test_is_access_change() {
        let alice = LocalIdentity::new("alice");
        let access = HeadBuilder::new(1, "access/1").sign(&alice).unwrap();
        let chat = HeadBuilder::new(2, "chat/m1").sign(&alice).unwrap();
        assert!(access.is_access_change());
        assert!(!chat.is_access_change());
    }
}
