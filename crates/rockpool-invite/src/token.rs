//! Invite token wire format.
//!
//! `base64(tokenJson) ":" base64(sig)` with `/` substituted by `_` to make
//! the result URL-safe (not full base64url: `+` is preserved). Token JSON
//! keys are single letters to minimize size.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use rockpool_cache::Cache;
use rockpool_core::{
    decrypt_block, ec_encrypt, encrypt_block, generate_bytes_key, Base64Bytes, BlockKey,
    BlockNonce, Ed25519Signature, Identity, LocalIdentity,
};
use rockpool_pool::Config;

use crate::error::{InviteError, Result};
use crate::invite::Invite;

#[derive(Debug, Serialize, Deserialize)]
struct Token {
    #[serde(rename = "s")]
    subject: String,
    #[serde(rename = "e")]
    sender_id: String,
    #[serde(rename = "d", default)]
    sender_nick: String,
    #[serde(rename = "n", default, skip_serializing_if = "Base64Bytes::is_empty")]
    nonce: Base64Bytes,
    #[serde(rename = "k", default, skip_serializing_if = "BTreeMap::is_empty")]
    keys: BTreeMap<String, Base64Bytes>,
    #[serde(rename = "c")]
    config: Base64Bytes,
}

/// Encode an invite as a signed token string.
///
/// When the invite names recipients, the config is sealed under a fresh
/// master key and the master key is asymmetrically encrypted to each
/// recipient; anyone else can read the outer fields but not the config.
pub fn encode(invite: &Invite, sender: &LocalIdentity) -> Result<String> {
    let config_json = serde_json::to_vec(&invite.config)
        .map_err(|e| InviteError::InvalidToken(e.to_string()))?;

    let mut token = Token {
        subject: invite.subject.clone(),
        sender_id: sender.id(),
        sender_nick: sender.nick().to_string(),
        nonce: Base64Bytes::default(),
        keys: BTreeMap::new(),
        config: Base64Bytes::new(config_json.clone()),
    };

    if !invite.recipient_ids.is_empty() {
        let nonce = BlockNonce::generate();
        let master = generate_bytes_key(32);
        let master_key = BlockKey::from_slice(&master)?;

        token.nonce = Base64Bytes::new(nonce.as_bytes().to_vec());
        token.config = Base64Bytes::new(encrypt_block(&master_key, &nonce, &config_json)?);
        for id in &invite.recipient_ids {
            let recipient = Identity::from_id(id)
                .map_err(|e| InviteError::InvalidToken(format!("recipient {id}: {e}")))?;
            token.keys.insert(id.clone(), Base64Bytes::new(ec_encrypt(&recipient, &master)?));
        }
    }

    let token_json =
        serde_json::to_vec(&token).map_err(|e| InviteError::InvalidToken(e.to_string()))?;
    let signature = sender.sign(&token_json);

    let wire = format!(
        "{}:{}",
        STANDARD.encode(&token_json),
        STANDARD.encode(signature.as_bytes())
    );
    Ok(wire.replace('/', "_"))
}

/// Decode and verify a token string.
///
/// The outer signature is checked against the claimed sender id. The
/// sender is recovered from the local trust store when known there (its
/// recorded nickname wins over the one the token ships); otherwise it is
/// synthesized from the id plus the token nick. The config is recovered
/// iff one of the token keys is addressed to `me`; otherwise the invite
/// is returned with `config = None` (a third-party invite, still useful
/// for listings).
pub async fn decode(me: &LocalIdentity, cache: &dyn Cache, token: &str) -> Result<Invite> {
    let token = token.replace('_', "/");
    let (token_b64, sig_b64) = match token.split_once(':') {
        Some((t, s)) if !t.is_empty() && !s.contains(':') => (t, s),
        _ => return Err(InviteError::InvalidToken("expected two ':' parts".into())),
    };

    let token_json = STANDARD
        .decode(token_b64)
        .map_err(|e| InviteError::InvalidToken(format!("token: {e}")))?;
    let sig_bytes = STANDARD
        .decode(sig_b64)
        .map_err(|e| InviteError::InvalidToken(format!("signature: {e}")))?;
    let sig_bytes: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| InviteError::InvalidToken("signature length".into()))?;

    let parsed: Token = serde_json::from_slice(&token_json)
        .map_err(|e| InviteError::InvalidToken(e.to_string()))?;

    rockpool_core::identity::verify_with_id(
        &parsed.sender_id,
        &token_json,
        &Ed25519Signature::from_bytes(sig_bytes),
    )
    .map_err(|_| InviteError::InvalidSignature)?;

    let sender = recover_sender(cache, &parsed.sender_id, &parsed.sender_nick).await?;

    let mut invite = Invite {
        subject: parsed.subject.clone(),
        sender,
        recipient_ids: Vec::new(),
        config: None,
    };

    let self_id = me.id();
    let mut master: Option<Vec<u8>> = None;
    for (id, sealed) in &parsed.keys {
        invite.recipient_ids.push(id.clone());
        if *id == self_id {
            master = Some(me.ec_decrypt(sealed.as_slice())?);
        }
    }

    if let Some(master) = master {
        let master_key = BlockKey::from_slice(&master)?;
        let nonce = BlockNonce::from_slice(parsed.nonce.as_slice())
            .map_err(|e| InviteError::InvalidToken(e.to_string()))?;
        let config_json = decrypt_block(&master_key, &nonce, parsed.config.as_slice())?;
        let config: Option<Config> = serde_json::from_slice(&config_json)
            .map_err(|e| InviteError::InvalidToken(format!("carried config: {e}")))?;
        invite.config = config;
    }

    Ok(invite)
}

/// The sender identity: the trust-store record when one exists,
/// synthesized from the id and the token nick otherwise.
async fn recover_sender(cache: &dyn Cache, sender_id: &str, sender_nick: &str) -> Result<Identity> {
    if let Some(stored) = cache.get_identity(sender_id).await? {
        if let Ok(known) = serde_json::from_str::<Identity>(&stored.identity) {
            return Ok(known);
        }
    }

    let mut sender = Identity::from_id(sender_id)
        .map_err(|e| InviteError::InvalidToken(e.to_string()))?;
    sender.nick = sender_nick.to_string();
    Ok(sender)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rockpool_cache::MemoryCache;

    fn sample_config() -> Config {
        Config {
            name: "team/p".into(),
            public: vec!["s3://bucket.example.com/pool".into()],
            private: vec![],
            apps: vec!["chat".into()],
        }
    }

    fn sample_invite(sender: &LocalIdentity, recipients: Vec<String>) -> Invite {
        Invite {
            subject: "join team/p".into(),
            sender: sender.public(),
            recipient_ids: recipients,
            config: Some(sample_config()),
        }
    }

    #[tokio::test]
    async fn test_roundtrip_for_recipient() {
        let alice = LocalIdentity::new("alice");
        let bob = LocalIdentity::new("bob");

        let token = encode(&sample_invite(&alice, vec![bob.id()]), &alice).unwrap();
        let decoded = decode(&bob, &MemoryCache::new(), &token).await.unwrap();

        assert_eq!(decoded.subject, "join team/p");
        assert_eq!(decoded.sender.id(), alice.id());
        assert_eq!(decoded.sender.nick, "alice");
        assert_eq!(decoded.recipient_ids, vec![bob.id()]);
        assert_eq!(decoded.config, Some(sample_config()));
    }

    #[tokio::test]
    async fn test_third_party_sees_no_config() {
        let alice = LocalIdentity::new("alice");
        let bob = LocalIdentity::new("bob");
        let carol = LocalIdentity::new("carol");

        let token = encode(&sample_invite(&alice, vec![bob.id()]), &alice).unwrap();
        let observed = decode(&carol, &MemoryCache::new(), &token).await.unwrap();

        assert_eq!(observed.sender.id(), alice.id());
        assert_eq!(observed.recipient_ids, vec![bob.id()]);
        assert!(observed.config.is_none());
    }

    #[tokio::test]
    async fn test_known_sender_keeps_recorded_nick() {
        // Alice is already a trusted contact; a token shipping a different
        // nick must not displace the recorded one.
        let alice = LocalIdentity::new("alice-real");
        let bob = LocalIdentity::new("bob");

        let cache = MemoryCache::new();
        let alice_json = serde_json::to_string(&alice.public()).unwrap();
        cache.set_identity(&alice.id(), &alice_json, true).await.unwrap();

        // Same keys, different shipped nick.
        let (sign, agree) = alice.seeds();
        let renamed = LocalIdentity::from_seeds(&sign, &agree, "not-alice");
        let token = encode(&sample_invite(&alice, vec![bob.id()]), &renamed).unwrap();

        let decoded = decode(&bob, &cache, &token).await.unwrap();
        assert_eq!(decoded.sender.nick, "alice-real");
        assert_eq!(decoded.sender.id(), alice.id());
    }

    #[test]
    fn test_wire_form_is_url_safe() {
        let alice = LocalIdentity::new("alice");
        let bob = LocalIdentity::new("bob");

        let token = encode(&sample_invite(&alice, vec![bob.id()]), &alice).unwrap();
        assert!(!token.contains('/'));
        assert_eq!(token.matches(':').count(), 1);
    }

    #[tokio::test]
    async fn test_tampered_token_rejected() {
        let alice = LocalIdentity::new("alice");
        let bob = LocalIdentity::new("bob");

        let token = encode(&sample_invite(&alice, vec![bob.id()]), &alice).unwrap();

        // Flip one character inside the token half.
        let mut tampered: Vec<char> = token.chars().collect();
        let pos = 10;
        tampered[pos] = if tampered[pos] == 'A' { 'B' } else { 'A' };
        let tampered: String = tampered.into_iter().collect();

        assert!(matches!(
            decode(&bob, &MemoryCache::new(), &tampered).await.unwrap_err(),
            InviteError::InvalidSignature | InviteError::InvalidToken(_)
        ));
    }

    #[tokio::test]
    async fn test_malformed_tokens_rejected() {
        let bob = LocalIdentity::new("bob");
        let cache = MemoryCache::new();
        for bad in ["", "justonepart", "a:b:c", "!!!:???"] {
            assert!(matches!(
                decode(&bob, &cache, bad).await.unwrap_err(),
                InviteError::InvalidToken(_)
            ));
        }
    }

    #[tokio::test]
    async fn test_multi_recipient() {
        let alice = LocalIdentity::new("alice");
        let bob = LocalIdentity::new("bob");
        let carol = LocalIdentity::new("carol");

        let invite = sample_invite(&alice, vec![bob.id(), carol.id()]);
        let token = encode(&invite, &alice).unwrap();

        for recipient in [&bob, &carol] {
            let decoded = decode(recipient, &MemoryCache::new(), &token).await.unwrap();
            assert_eq!(decoded.config, Some(sample_config()));
            assert_eq!(decoded.recipient_ids.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_unaddressed_token_keeps_outer_fields() {
        // No recipients at all: the config is carried for no one.
        let alice = LocalIdentity::new("alice");
        let bob = LocalIdentity::new("bob");

        let token = encode(&sample_invite(&alice, vec![]), &alice).unwrap();
        let decoded = decode(&bob, &MemoryCache::new(), &token).await.unwrap();
        assert!(decoded.recipient_ids.is_empty());
        assert!(decoded.config.is_none());
    }
}
